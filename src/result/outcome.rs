use crate::core::Payload;
use http::StatusCode;
use serde::{Serialize, Serializer};
use std::fmt;

/// Status classification attached to every outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Ok,
    NotFound,
    UnprocessableEntity,
    InternalError,
}

impl StatusClass {
    pub fn http_status(&self) -> StatusCode {
        match self {
            StatusClass::Ok => StatusCode::OK,
            StatusClass::NotFound => StatusCode::NOT_FOUND,
            StatusClass::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            StatusClass::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_u16(&self) -> u16 {
        self.http_status().as_u16()
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusClass::Ok => write!(f, "OK"),
            StatusClass::NotFound => write!(f, "NOT_FOUND"),
            StatusClass::UnprocessableEntity => write!(f, "UNPROCESSABLE_ENTITY"),
            StatusClass::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// Tagged outcome of a pipeline stage or of the whole endpoint.
///
/// Values are built once (normally through [`super::ResultBuilder`]) and never
/// mutated afterwards. Serializes as `{success, message, data?}`.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Success {
        message: String,
        data: Option<Payload>,
    },
    NotFound {
        message: String,
    },
    Invalid {
        message: String,
    },
    Failure {
        message: String,
    },
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            OperationResult::Success { message, .. }
            | OperationResult::NotFound { message }
            | OperationResult::Invalid { message }
            | OperationResult::Failure { message } => message,
        }
    }

    pub fn data(&self) -> Option<&Payload> {
        match self {
            OperationResult::Success { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    pub fn status(&self) -> StatusClass {
        match self {
            OperationResult::Success { .. } => StatusClass::Ok,
            OperationResult::NotFound { .. } => StatusClass::NotFound,
            OperationResult::Invalid { .. } => StatusClass::UnprocessableEntity,
            OperationResult::Failure { .. } => StatusClass::InternalError,
        }
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status(), self.message())
    }
}

#[derive(Serialize)]
struct ResultBody<'a> {
    success: bool,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Payload>,
}

impl Serialize for OperationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ResultBody {
            success: self.is_success(),
            message: self.message(),
            data: self.data(),
        }
        .serialize(serializer)
    }
}
