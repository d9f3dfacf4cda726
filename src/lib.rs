// ============================================================================
// rowgate Library
// ============================================================================

pub mod config;
pub mod core;
pub mod endpoint;
pub mod gateway;
pub mod mutation;
pub mod notify;
pub mod result;
pub mod storage;
pub mod transaction;
pub mod validation;
pub mod web;

// Re-export main types for convenience
pub use config::{AppConfig, EndpointConfig};
pub use crate::core::{EndpointError, Input, Payload, Record, RecordId, RecordType, Result};
pub use endpoint::{EndpointController, FailureKind, PipelineOutcome, PipelineState};
pub use gateway::{ExternalGateway, FixedStatusGateway, GatewayResponse, HttpGateway};
pub use notify::{CommitListener, LoggingListener, Notification, PostCommitNotifier};
pub use result::{OperationResult, ResultBuilder, StatusClass};
pub use storage::{InMemoryRecordStore, RecordStore};
pub use transaction::{Transaction, TransactionManager};
pub use web::{AppState, build_router};

use anyhow::Context;
use std::sync::Arc;

// ============================================================================
// Application wiring
// ============================================================================

/// Store, gateway and controller assembled from an [`AppConfig`].
///
/// # Examples
///
/// ```no_run
/// use rowgate::{AppConfig, Input, Rowgate};
///
/// # async fn run() -> anyhow::Result<()> {
/// let app = Rowgate::from_config(&AppConfig::from_env()?)?;
/// let result = app.controller.handle(&Input::new(1, "test", "bank_account")).await;
/// println!("{}", result);
/// # Ok(())
/// # }
/// ```
pub struct Rowgate {
    pub store: Arc<InMemoryRecordStore>,
    pub controller: Arc<EndpointController>,
}

impl Rowgate {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let store = match &config.data_dir {
            Some(dir) => InMemoryRecordStore::open(dir, config.durability, config.endpoint.lock_timeout)
                .with_context(|| format!("failed to open record store in {}", dir.display()))?,
            None => InMemoryRecordStore::with_lock_timeout(config.endpoint.lock_timeout),
        };
        let store = Arc::new(store);

        let gateway: Arc<dyn ExternalGateway> = match &config.gateway_url {
            Some(url) => Arc::new(
                HttpGateway::new(url.clone(), config.gateway_timeout)
                    .context("failed to build external gateway client")?,
            ),
            None => Arc::new(FixedStatusGateway::accepting()),
        };

        let controller = EndpointController::new(store.clone(), gateway, &config.endpoint)
            .with_listener(Arc::new(LoggingListener));

        Ok(Self {
            store,
            controller: Arc::new(controller),
        })
    }

    pub fn router(&self) -> axum::Router {
        build_router(AppState::new(Arc::clone(&self.controller)))
    }
}
