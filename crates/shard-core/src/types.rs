//! Shared types used across shardgrid crates.
//!
//! These mirror what the remote stream service reports. Hash keys stay as
//! decimal strings at this layer; parsing into `u128` happens when the
//! topology is built.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque shard identifier as assigned by the stream service.
pub type ShardId = String;

/// Lifecycle status of a stream as reported by `describe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamStatus {
    Active,
    Updating,
    Creating,
    Deleting,
}

impl StreamStatus {
    /// Only an ACTIVE stream accepts split and merge requests.
    pub fn accepts_resharding(&self) -> bool {
        matches!(self, StreamStatus::Active)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StreamStatus::Active => "ACTIVE",
            StreamStatus::Updating => "UPDATING",
            StreamStatus::Creating => "CREATING",
            StreamStatus::Deleting => "DELETING",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raw shard descriptor, exactly as the stream service reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDescriptor {
    pub id: ShardId,
    /// Inclusive lower bound of the hash key range, decimal.
    pub starting_hash: String,
    /// Inclusive upper bound of the hash key range, decimal.
    pub ending_hash: String,
    /// Parent shard for a split child, or the first parent of a merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ShardId>,
    /// Second parent of a merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjacent_parent_id: Option<ShardId>,
}

impl ShardDescriptor {
    pub fn new(id: &str, starting_hash: u128, ending_hash: u128) -> Self {
        Self {
            id: id.to_string(),
            starting_hash: starting_hash.to_string(),
            ending_hash: ending_hash.to_string(),
            parent_id: None,
            adjacent_parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    pub fn with_adjacent_parent(mut self, adjacent_parent_id: &str) -> Self {
        self.adjacent_parent_id = Some(adjacent_parent_id.to_string());
        self
    }
}

/// Result of a `describe` call: stream status plus every known shard,
/// open and closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescription {
    pub status: StreamStatus,
    pub shards: Vec<ShardDescriptor>,
}

/// Traffic direction for throughput metrics and capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Bytes written into the stream.
    Input,
    /// Bytes read out of the stream.
    Output,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Input, Direction::Output];

    pub fn label(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
