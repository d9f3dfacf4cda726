// ============================================================================
// Endpoint Controller
// ============================================================================
//
// Runs one update request through the pipeline:
//
//   Fetching -> Validating -> Mutating -> Finalizing -> Done
//        \           \            \            \
//         +-----------+------------+------------+--> Failed(kind)
//
// The row lock taken while fetching is held by the transaction until it
// commits or is dropped. Finalize runs inside a savepoint so a refused
// gateway call leaves nothing staged.
//
// ============================================================================

use crate::config::EndpointConfig;
use crate::core::{EndpointError, GatewayError, Input, Record, Result};
use crate::gateway::ExternalGateway;
use crate::mutation::Mutator;
use crate::notify::{CommitListener, PostCommitNotifier};
use crate::result::{OperationResult, ResultBuilder};
use crate::storage::RecordStore;
use crate::transaction::manager::panic_message;
use crate::transaction::{Transaction, TransactionManager};
use crate::validation::Validator;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

pub const SUCCESS_MESSAGE: &str = "Operation completed successfully";
pub const FETCHED_MESSAGE: &str = "Object fetched successfully";
pub const VALIDATED_MESSAGE: &str = "Input validated successfully";
pub const MUTATED_MESSAGE: &str = "Object attributes updated successfully";
pub const FINALIZED_MESSAGE: &str = "Object finalized successfully";

/// Why a pipeline ended in [`PipelineState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Invalid,
    ExternalCall,
    Storage,
    Unexpected,
}

impl From<&EndpointError> for FailureKind {
    fn from(err: &EndpointError) -> Self {
        match err {
            EndpointError::NotFound(_) => FailureKind::NotFound,
            EndpointError::Validation(_) => FailureKind::Invalid,
            EndpointError::ExternalCall(_) => FailureKind::ExternalCall,
            EndpointError::Storage(_) => FailureKind::Storage,
            EndpointError::Mutation(_) | EndpointError::Unexpected(_) => FailureKind::Unexpected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Fetching,
    Validating,
    Mutating,
    Finalizing,
    Done,
    Failed(FailureKind),
}

impl PipelineState {
    /// Component tag used in the results a stage produces.
    pub fn component(&self) -> &'static str {
        match self {
            PipelineState::Fetching => "fetcher",
            PipelineState::Validating => "validator",
            PipelineState::Mutating => "mutator",
            PipelineState::Finalizing => "finalizer",
            PipelineState::Done | PipelineState::Failed(_) => "endpoint",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }

    fn results(&self) -> ResultBuilder {
        ResultBuilder::new(self.component())
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Fetching => write!(f, "FETCHING"),
            PipelineState::Validating => write!(f, "VALIDATING"),
            PipelineState::Mutating => write!(f, "MUTATING"),
            PipelineState::Finalizing => write!(f, "FINALIZING"),
            PipelineState::Done => write!(f, "DONE"),
            PipelineState::Failed(kind) => write!(f, "FAILED({:?})", kind),
        }
    }
}

/// Terminal state of one invocation together with its result.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub state: PipelineState,
    pub result: OperationResult,
    /// Success results of the stages that completed, in order.
    pub stages: Vec<OperationResult>,
}

/// Fetch-validate-mutate-finalize pipeline over one record store.
pub struct EndpointController {
    store: Arc<dyn RecordStore>,
    transactions: TransactionManager,
    validator: Validator,
    mutator: Mutator,
    gateway: Arc<dyn ExternalGateway>,
    notifier: PostCommitNotifier,
    results: ResultBuilder,
}

impl EndpointController {
    pub fn new(
        store: Arc<dyn RecordStore>,
        gateway: Arc<dyn ExternalGateway>,
        config: &EndpointConfig,
    ) -> Self {
        Self {
            transactions: TransactionManager::new(Arc::clone(&store)),
            notifier: PostCommitNotifier::new(Arc::clone(&store)),
            store,
            validator: Validator::new(config.max_name_length),
            mutator: Mutator::new(),
            gateway,
            results: ResultBuilder::new("endpoint"),
        }
    }

    /// Add a consumer of post-commit notifications.
    pub fn with_listener(mut self, listener: Arc<dyn CommitListener>) -> Self {
        self.notifier = self.notifier.with_listener(listener);
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Run the pipeline. Never fails: every error and panic becomes a result.
    pub async fn handle(&self, input: &Input) -> OperationResult {
        self.handle_detailed(input).await.result
    }

    pub async fn handle_detailed(&self, input: &Input) -> PipelineOutcome {
        let span = info_span!("pipeline", request_id = %Uuid::new_v4(), record_id = input.id);
        async {
            let mut state = PipelineState::Fetching;
            let mut stages = Vec::new();
            let outcome = AssertUnwindSafe(self.run(input, &mut state, &mut stages))
                .catch_unwind()
                .await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(panic) => Err(EndpointError::Unexpected(panic_message(panic.as_ref()))),
            };

            match outcome {
                Ok(record) => {
                    self.transition(&mut state, PipelineState::Done);
                    info!(record_id = record.id, version = record.version, "Object {} successfully processed", record.id);
                    PipelineOutcome {
                        state,
                        result: self.results.success_with(SUCCESS_MESSAGE, record.to_payload()),
                        stages,
                    }
                }
                Err(err) => {
                    let stage = state;
                    self.transition(&mut state, PipelineState::Failed(FailureKind::from(&err)));
                    warn!(stage = %stage, error = %err, "pipeline aborted");
                    PipelineOutcome {
                        state,
                        result: stage.results().from_error(&err),
                        stages,
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    fn transition(&self, state: &mut PipelineState, next: PipelineState) {
        debug!(from = %state, to = %next, "pipeline state");
        *state = next;
    }

    async fn run(
        &self,
        input: &Input,
        state: &mut PipelineState,
        stages: &mut Vec<OperationResult>,
    ) -> Result<Record> {
        let mut txn = self.transactions.begin();
        let mut record = self
            .store
            .fetch_locked(&mut txn, input.id)
            .await?
            .ok_or(EndpointError::NotFound(input.id))?;
        stages.push(state.results().success_with(FETCHED_MESSAGE, record.to_payload()));

        self.transition(state, PipelineState::Validating);
        self.validator.validate(input)?;
        stages.push(state.results().success(VALIDATED_MESSAGE));

        self.transition(state, PipelineState::Mutating);
        self.mutator.apply(&mut record, input)?;
        stages.push(state.results().success(MUTATED_MESSAGE));

        self.transition(state, PipelineState::Finalizing);
        self.finalize(&mut txn, &mut record, input).await?;
        let report = self.transactions.commit(txn).await?;
        stages.push(state.results().success(FINALIZED_MESSAGE));

        Ok(report
            .records
            .into_iter()
            .find(|committed| committed.id == record.id)
            .unwrap_or(record))
    }

    /// Gateway call, detail merge, persist and hook registration, all or nothing.
    async fn finalize(&self, txn: &mut Transaction, record: &mut Record, input: &Input) -> Result<()> {
        let savepoint = txn.savepoint()?;
        match self.finalize_scoped(txn, record, input).await {
            Ok(()) => {
                txn.release(savepoint)?;
                Ok(())
            }
            Err(err) => {
                txn.rollback_to(savepoint)?;
                Err(err)
            }
        }
    }

    async fn finalize_scoped(&self, txn: &mut Transaction, record: &mut Record, input: &Input) -> Result<()> {
        let response = self.gateway.call(record, input).await?;
        if !response.is_success() {
            return Err(GatewayError::Status(response.status).into());
        }

        let merged = self.mutator.merge_details(record, &input.details);
        debug!(record_id = record.id, merged, "details merged");

        self.store.persist(txn, record).await?;
        txn.on_commit(self.notifier.hook(record.id, input))?;
        Ok(())
    }
}

impl fmt::Debug for EndpointController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointController")
            .field("validator", &self.validator)
            .field("notifier", &self.notifier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GatewayError, RecordType};
    use crate::gateway::{FixedStatusGateway, GatewayResponse};
    use crate::storage::InMemoryRecordStore;
    use async_trait::async_trait;

    struct PanickingGateway;

    #[async_trait]
    impl ExternalGateway for PanickingGateway {
        async fn call(&self, _record: &Record, _input: &Input) -> std::result::Result<GatewayResponse, GatewayError> {
            panic!("gateway blew up")
        }
    }

    fn controller(gateway: Arc<dyn ExternalGateway>) -> (Arc<InMemoryRecordStore>, EndpointController) {
        let store = Arc::new(
            InMemoryRecordStore::new().with_records([Record::new(1, "seed", RecordType::BankAccount)]),
        );
        let controller = EndpointController::new(store.clone(), gateway, &EndpointConfig::default());
        (store, controller)
    }

    #[tokio::test]
    async fn test_success_reaches_done() {
        let (_, controller) = controller(Arc::new(FixedStatusGateway::accepting()));

        let outcome = controller
            .handle_detailed(&Input::new(1, "test", "bank_account"))
            .await;

        assert_eq!(outcome.state, PipelineState::Done);
        assert_eq!(outcome.result.message(), SUCCESS_MESSAGE);
        let data = outcome.result.data().unwrap();
        assert_eq!(data["name"], "test_object");
        assert_eq!(data["version"], 2);
    }

    #[tokio::test]
    async fn test_each_stage_reports_its_outcome() {
        let (_, controller) = controller(Arc::new(FixedStatusGateway::accepting()));

        let outcome = controller
            .handle_detailed(&Input::new(1, "test", "bank_account"))
            .await;

        let messages: Vec<&str> = outcome.stages.iter().map(OperationResult::message).collect();
        assert_eq!(
            messages,
            vec![FETCHED_MESSAGE, VALIDATED_MESSAGE, MUTATED_MESSAGE, FINALIZED_MESSAGE]
        );
        assert!(outcome.stages.iter().all(OperationResult::is_success));
        assert_eq!(outcome.stages[0].data().unwrap()["name"], "seed");
    }

    #[tokio::test]
    async fn test_failed_stage_stops_the_report() {
        let (_, controller) = controller(Arc::new(FixedStatusGateway::accepting()));

        let outcome = controller.handle_detailed(&Input::new(1, "test", "car")).await;

        assert_eq!(outcome.stages.len(), 1);
        assert_eq!(outcome.stages[0].message(), FETCHED_MESSAGE);
        assert_eq!(outcome.result.message(), "Invalid input type: car");
    }

    #[tokio::test]
    async fn test_failure_kind_follows_error() {
        let (_, controller) = controller(Arc::new(FixedStatusGateway::new(503)));

        let missing = controller.handle_detailed(&Input::new(7, "test", "bank_account")).await;
        assert_eq!(missing.state, PipelineState::Failed(FailureKind::NotFound));

        let invalid = controller.handle_detailed(&Input::new(1, "test", "car")).await;
        assert_eq!(invalid.state, PipelineState::Failed(FailureKind::Invalid));

        let refused = controller.handle_detailed(&Input::new(1, "test", "bank_account")).await;
        assert_eq!(refused.state, PipelineState::Failed(FailureKind::ExternalCall));
        assert_eq!(
            refused.result.message(),
            "External gateway call failed with status: 503"
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_unexpected_failure() {
        let (store, controller) = controller(Arc::new(PanickingGateway));

        let outcome = controller.handle_detailed(&Input::new(1, "test", "bank_account")).await;

        assert_eq!(outcome.state, PipelineState::Failed(FailureKind::Unexpected));
        assert_eq!(outcome.result.message(), "Unexpected error: gateway blew up");
        assert_eq!(store.get(1).await.unwrap().unwrap().name, "seed");
        assert!(!store.locks().is_locked(1).await);
    }

    #[test]
    fn test_stage_components() {
        assert_eq!(PipelineState::Fetching.component(), "fetcher");
        assert_eq!(PipelineState::Finalizing.component(), "finalizer");
        assert!(PipelineState::Failed(FailureKind::Storage).is_terminal());
        assert!(!PipelineState::Mutating.is_terminal());
    }
}
