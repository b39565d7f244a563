//! Error types for the partition model.

use thiserror::Error;

/// Result type alias for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors raised while building or querying a topology.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("malformed shard {id}: {reason}")]
    MalformedShard { id: String, reason: String },

    #[error("shard {shard} references unknown parent {parent}")]
    Lineage { shard: String, parent: String },

    #[error("open shards do not tile the hash space: {0}")]
    Coverage(String),

    #[error("shard {0} covers a single hash key and cannot be split")]
    Unsplittable(String),

    #[error("shard {0} is closed")]
    AlreadyClosed(String),
}

impl TopologyError {
    /// Data-integrity faults invalidate the whole refresh; everything else
    /// is scoped to a single action.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            TopologyError::MalformedShard { .. }
                | TopologyError::Lineage { .. }
                | TopologyError::Coverage(_)
        )
    }
}
