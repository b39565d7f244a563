//! Action executor — issues one split or merge through the stream gateway.
//!
//! Built per tick around the topology and stream status that tick observed.
//! It never mutates the topology: whatever the service does only shows up
//! on the next refresh.

use std::time::Duration;

use serde::Serialize;
use shard_core::{ShardId, StreamStatus};
use shardgrid_gateway::{GatewayError, StreamGateway};
use shardgrid_topology::{Shard, Topology, TopologyError};
use thiserror::Error;
use tracing::info;

/// Wait before the next attempt when the stream is not ACTIVE.
pub const NOT_ACTIVE_BACKOFF: Duration = Duration::from_secs(60);

pub type ActionResult<T> = Result<T, ActionError>;

#[derive(Debug, Error)]
pub enum ActionError {
    /// The target shard is closed or cannot be split.
    #[error(transparent)]
    Precondition(#[from] TopologyError),

    #[error("shards {lower} and {upper} are not adjacent")]
    NotAdjacent { lower: ShardId, upper: ShardId },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// A resharding request, fully resolved against one topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Split { shard_id: ShardId, split_point: String },
    Merge { lower: ShardId, upper: ShardId },
}

impl Action {
    /// Resolve a split of `shard`, failing if it covers a single key.
    pub fn split(shard: &Shard) -> Result<Self, TopologyError> {
        Ok(Action::Split {
            shard_id: shard.id.clone(),
            split_point: shard.split_point()?.to_string(),
        })
    }

    pub fn merge(lower: &Shard, upper: &Shard) -> Self {
        Action::Merge {
            lower: lower.id.clone(),
            upper: upper.id.clone(),
        }
    }

    /// Shards this action closes once the service applies it.
    pub fn shard_ids(&self) -> Vec<ShardId> {
        match self {
            Action::Split { shard_id, .. } => vec![shard_id.clone()],
            Action::Merge { lower, upper } => vec![lower.clone(), upper.clone()],
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        match self {
            Action::Split { shard_id, .. } => shard_id == id,
            Action::Merge { lower, upper } => lower == id || upper == id,
        }
    }
}

/// What happened to an action that passed its preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The gateway accepted the request.
    Issued,
    /// Dry-run mode: logged, not sent.
    DryRun,
    /// The stream was not ACTIVE; nothing was sent.
    Deferred { retry_after: Duration },
}

pub struct ActionExecutor<'a, S> {
    gateway: &'a S,
    stream: &'a str,
    topology: &'a Topology,
    status: StreamStatus,
    dry_run: bool,
}

impl<'a, S: StreamGateway> ActionExecutor<'a, S> {
    pub fn new(gateway: &'a S, stream: &'a str, topology: &'a Topology, status: StreamStatus) -> Self {
        Self {
            gateway,
            stream,
            topology,
            status,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Split `shard` at its midpoint.
    pub async fn execute_split(&self, shard: &Shard) -> ActionResult<ActionOutcome> {
        self.ensure_leaf(shard)?;
        let action = Action::split(shard)?;
        self.dispatch(action).await
    }

    /// Merge two adjacent open shards, `lower` first.
    pub async fn execute_merge(&self, lower: &Shard, upper: &Shard) -> ActionResult<ActionOutcome> {
        self.ensure_leaf(lower)?;
        self.ensure_leaf(upper)?;
        if !lower.precedes(upper) {
            return Err(ActionError::NotAdjacent {
                lower: lower.id.clone(),
                upper: upper.id.clone(),
            });
        }
        self.dispatch(Action::merge(lower, upper)).await
    }

    fn ensure_leaf(&self, shard: &Shard) -> ActionResult<()> {
        if shard.is_closed() || !self.topology.is_leaf(&shard.id) {
            return Err(TopologyError::AlreadyClosed(shard.id.clone()).into());
        }
        Ok(())
    }

    async fn dispatch(&self, action: Action) -> ActionResult<ActionOutcome> {
        if !self.status.accepts_resharding() {
            info!(
                stream = %self.stream,
                status = %self.status,
                ?action,
                retry_after_secs = NOT_ACTIVE_BACKOFF.as_secs(),
                "stream not active, deferring"
            );
            return Ok(ActionOutcome::Deferred {
                retry_after: NOT_ACTIVE_BACKOFF,
            });
        }

        if self.dry_run {
            info!(stream = %self.stream, ?action, "dry run, not issuing");
            return Ok(ActionOutcome::DryRun);
        }

        match &action {
            Action::Split {
                shard_id,
                split_point,
            } => {
                self.gateway.split(self.stream, shard_id, split_point).await?;
                info!(stream = %self.stream, %shard_id, %split_point, "split requested");
            }
            Action::Merge { lower, upper } => {
                self.gateway.merge(self.stream, lower, upper).await?;
                info!(stream = %self.stream, %lower, %upper, "merge requested");
            }
        }
        Ok(ActionOutcome::Issued)
    }
}
