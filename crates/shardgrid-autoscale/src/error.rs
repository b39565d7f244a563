//! Errors that end the control loop.

use shardgrid_gateway::GatewayError;
use thiserror::Error;

pub type ScaleResult<T> = Result<T, ScaleError>;

/// Only failures the loop cannot survive surface here; everything else is
/// logged and the tick is skipped.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("gateway unreachable: {0}")]
    Gateway(#[from] GatewayError),
}
