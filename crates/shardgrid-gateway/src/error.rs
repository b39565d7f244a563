//! Error types for gateway calls.

use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The service endpoint cannot be reached at all. Fatal.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request rate exceeded; the same request may succeed later.
    #[error("throttled: {0}")]
    Throttled(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The service refused the request as issued (bad shard, bad split
    /// point, stream busy).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("service error: {0}")]
    Service(String),
}

impl GatewayError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Connection(_))
    }

    pub fn is_throttle(&self) -> bool {
        matches!(self, GatewayError::Throttled(_))
    }
}
