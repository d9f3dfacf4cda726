use super::OperationResult;
use crate::core::{EndpointError, Payload};
use tracing::{error, info, warn};

/// Builds [`OperationResult`] values and logs each one as it is created.
///
/// Every component owns its own builder tagged with the component name, so log
/// lines can be traced back to the stage that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultBuilder {
    component: &'static str,
}

impl ResultBuilder {
    pub const fn new(component: &'static str) -> Self {
        Self { component }
    }

    pub const fn component(&self) -> &'static str {
        self.component
    }

    pub fn success(&self, message: impl Into<String>) -> OperationResult {
        let message = message.into();
        info!(component = self.component, "{}", message);
        OperationResult::Success { message, data: None }
    }

    pub fn success_with(&self, message: impl Into<String>, data: Payload) -> OperationResult {
        let message = message.into();
        info!(component = self.component, "{}", message);
        OperationResult::Success { message, data: Some(data) }
    }

    pub fn not_found(&self, message: impl Into<String>) -> OperationResult {
        let message = message.into();
        warn!(component = self.component, "{}", message);
        OperationResult::NotFound { message }
    }

    pub fn invalid(&self, message: impl Into<String>) -> OperationResult {
        let message = message.into();
        warn!(component = self.component, "{}", message);
        OperationResult::Invalid { message }
    }

    pub fn failure(&self, message: impl Into<String>) -> OperationResult {
        let message = message.into();
        error!(component = self.component, "{}", message);
        OperationResult::Failure { message }
    }

    /// Converts a pipeline error into its result tag.
    pub fn from_error(&self, err: &EndpointError) -> OperationResult {
        match err {
            EndpointError::NotFound(_) => self.not_found(err.to_string()),
            EndpointError::Validation(_) => self.invalid(err.to_string()),
            EndpointError::Mutation(_)
            | EndpointError::ExternalCall(_)
            | EndpointError::Storage(_)
            | EndpointError::Unexpected(_) => self.failure(err.to_string()),
        }
    }
}
