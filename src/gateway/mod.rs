//! External collaborator called inside the finalize step.
//!
//! A call is all-or-nothing from the pipeline's point of view: it either
//! returns a status code or fails in transport. Timeouts and retries belong
//! to the gateway implementation.

use crate::core::{GatewayError, Input, Record};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: u16,
}

impl GatewayResponse {
    pub fn new(status: u16) -> Self {
        Self { status }
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait ExternalGateway: Send + Sync {
    async fn call(&self, record: &Record, input: &Input) -> Result<GatewayResponse, GatewayError>;
}

/// Gateway answering every call with the same status, without leaving the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedStatusGateway {
    status: u16,
}

impl FixedStatusGateway {
    pub fn new(status: u16) -> Self {
        Self { status }
    }

    /// Always answers 200.
    pub fn accepting() -> Self {
        Self::new(200)
    }
}

impl Default for FixedStatusGateway {
    fn default() -> Self {
        Self::accepting()
    }
}

#[async_trait]
impl ExternalGateway for FixedStatusGateway {
    async fn call(&self, record: &Record, input: &Input) -> Result<GatewayResponse, GatewayError> {
        info!(record_id = record.id, input_name = %input.name, status = self.status, "external gateway called");
        Ok(GatewayResponse::new(self.status))
    }
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
    record: &'a Record,
    input: &'a Input,
}

/// Gateway POSTing `{record, input}` as JSON to a remote endpoint.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    url: String,
}

impl HttpGateway {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ExternalGateway for HttpGateway {
    async fn call(&self, record: &Record, input: &Input) -> Result<GatewayResponse, GatewayError> {
        debug!(url = %self.url, record_id = record.id, "posting to external gateway");
        let response = self
            .client
            .post(&self.url)
            .json(&GatewayRequest { record, input })
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        info!(url = %self.url, record_id = record.id, status, "external gateway responded");
        Ok(GatewayResponse::new(status))
    }
}
