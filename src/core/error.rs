use super::types::RecordId;
use thiserror::Error;

/// Business-rule violations reported by the validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Input name '{name}' exceeds length limit")]
    NameTooLong { name: String, limit: usize },

    #[error("Invalid input type: {0}")]
    InvalidType(String),
}

/// Invariant violations found while applying an input onto a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("Record id {record} does not match input id {input}")]
    IdMismatch { record: RecordId, input: RecordId },
}

/// Failures of the external collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("External gateway call failed with status: {0}")]
    Status(u16),

    #[error("External gateway unreachable: {0}")]
    Transport(String),
}

/// Lock, persistence and transaction-state failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Timed out waiting for lock on record {0}")]
    LockTimeout(RecordId),

    #[error("Record {0} is not locked by this transaction")]
    NotLocked(RecordId),

    #[error("Transaction {0} is not active")]
    TransactionNotActive(String),

    #[error("Invalid savepoint: {0}")]
    InvalidSavepoint(String),

    #[error("Write conflict on record {id}: expected version {expected}, found {found}")]
    Conflict { id: RecordId, expected: u64, found: u64 },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

/// Everything that can stop the mutation pipeline.
///
/// Each variant maps to exactly one [`crate::result::OperationResult`] tag:
/// `NotFound` to not-found, `Validation` to invalid, everything else to failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Object with id {0} not found")]
    NotFound(RecordId),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    ExternalCall(#[from] GatewayError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, EndpointError>;

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
