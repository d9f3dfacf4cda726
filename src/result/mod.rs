// ============================================================================
// Operation Results
// ============================================================================
//
// Tagged outcomes returned by every pipeline stage, their status
// classification and the builder that logs them.
//
// ============================================================================

pub mod builder;
pub mod outcome;

pub use builder::ResultBuilder;
pub use outcome::{OperationResult, StatusClass};
