pub mod error;
pub mod types;

pub use error::{
    EndpointError, GatewayError, MutationError, Result, StoreError, ValidationError,
};
pub use types::{Input, Payload, Record, RecordId, RecordType};
