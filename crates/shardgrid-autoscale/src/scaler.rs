//! Control loop — refresh, measure, decide, act, sleep.
//!
//! Each tick rebuilds the topology from a full `describe`, converts byte
//! counters into utilization, picks at most one action, and hands it to the
//! executor. Ticks never overlap: the next one starts only after the sleep.
//! Only a connection failure ends the loop early; everything else is logged
//! and the tick is skipped.

use std::time::Duration;

use serde::Serialize;
use shard_core::{Direction, ShardConfig, ShardDescriptor, ShardId, StreamStatus};
use shardgrid_gateway::{MetricsGateway, StreamGateway};
use shardgrid_metrics::{normalize_period, CapacityEstimator, Utilization};
use shardgrid_topology::{HashSpace, Topology, TopologyResult};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::decision::{DecisionEngine, ScaleDecision};
use crate::error::ScaleResult;
use crate::executor::{Action, ActionError, ActionExecutor, ActionOutcome, NOT_ACTIVE_BACKOFF};

/// How a tick ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Nothing to do this tick.
    NoAction,
    /// Action resolved but not executed (plan mode).
    Planned,
    Issued,
    DryRun,
    /// Stream not ACTIVE; next attempt after the backoff.
    Deferred { retry_after_secs: u64 },
    /// Tick abandoned; the reason was logged.
    Skipped { reason: String },
}

impl From<ActionOutcome> for TickOutcome {
    fn from(outcome: ActionOutcome) -> Self {
        match outcome {
            ActionOutcome::Issued => TickOutcome::Issued,
            ActionOutcome::DryRun => TickOutcome::DryRun,
            ActionOutcome::Deferred { retry_after } => TickOutcome::Deferred {
                retry_after_secs: retry_after.as_secs(),
            },
        }
    }
}

/// Everything one tick observed and did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub stream: String,
    pub status: Option<StreamStatus>,
    pub shards: usize,
    pub leaves: usize,
    pub period_secs: u64,
    pub utilization: Option<Utilization>,
    pub decision: ScaleDecision,
    pub action: Option<Action>,
    pub outcome: TickOutcome,
}

impl TickReport {
    fn new(stream: &str, period_secs: u64) -> Self {
        Self {
            stream: stream.to_string(),
            status: None,
            shards: 0,
            leaves: 0,
            period_secs,
            utilization: None,
            decision: ScaleDecision::NoAction,
            action: None,
            outcome: TickOutcome::NoAction,
        }
    }

    fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.outcome = TickOutcome::Skipped {
            reason: reason.into(),
        };
        self
    }
}

/// Drives one stream's shard count.
///
/// Owns both gateway handles for its whole lifetime.
pub struct ControlLoop<S, M> {
    stream: String,
    gateway: S,
    metrics: M,
    estimator: CapacityEstimator,
    engine: DecisionEngine,
    hash_space: HashSpace,
    interval: Duration,
    period_secs: u64,
    dry_run: bool,
    /// Shards closed by the last issued action, awaiting a refresh that
    /// shows them closed.
    in_flight: Vec<ShardId>,
}

impl<S: StreamGateway, M: MetricsGateway> ControlLoop<S, M> {
    pub fn new(config: &ShardConfig, gateway: S, metrics: M) -> Self {
        Self {
            stream: config.stream.name.clone(),
            gateway,
            metrics,
            estimator: CapacityEstimator::new(config.capacity.clone()),
            engine: DecisionEngine::new(config.thresholds.clone()),
            hash_space: HashSpace::default(),
            interval: Duration::from_secs(config.controller.check_interval_secs),
            period_secs: normalize_period(config.controller.metrics_period_secs),
            dry_run: config.controller.dry_run,
            in_flight: Vec::new(),
        }
    }

    /// Restrict the key space the leaves must tile.
    pub fn with_hash_space(mut self, space: HashSpace) -> Self {
        self.hash_space = space;
        self
    }

    pub fn gateway(&self) -> &S {
        &self.gateway
    }

    pub fn metrics(&self) -> &M {
        &self.metrics
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one full tick, issuing at most one action.
    pub async fn tick(&mut self) -> ScaleResult<TickReport> {
        self.evaluate(true).await
    }

    /// Refresh and decide without acting.
    pub async fn plan(&mut self) -> ScaleResult<TickReport> {
        self.evaluate(false).await
    }

    /// Tick until `shutdown` fires or the gateway becomes unreachable.
    ///
    /// A connection failure from any call in any tick (describe, metrics,
    /// split or merge) ends the loop with an error.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> ScaleResult<()> {
        info!(
            stream = %self.stream,
            interval_secs = self.interval.as_secs(),
            period_secs = self.period_secs,
            dry_run = self.dry_run,
            "control loop started"
        );

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }

            let report = self.tick().await?;
            let pause = match report.outcome {
                TickOutcome::Deferred { .. } => NOT_ACTIVE_BACKOFF,
                _ => self.interval,
            };
            debug!(pause_secs = pause.as_secs(), "sleeping until next tick");

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(stream = %self.stream, "control loop shutting down");
        Ok(())
    }

    async fn evaluate(&mut self, act: bool) -> ScaleResult<TickReport> {
        let mut report = TickReport::new(&self.stream, self.period_secs);

        // 1. Refresh.
        let description = match self.gateway.describe(&self.stream).await {
            Ok(d) => d,
            Err(e) if e.is_fatal() => {
                error!(stream = %self.stream, error = %e, "stream gateway unreachable");
                return Err(e.into());
            }
            Err(e) => {
                warn!(stream = %self.stream, error = %e, "describe failed, skipping tick");
                return Ok(report.skipped(format!("describe failed: {e}")));
            }
        };
        report.status = Some(description.status);

        // 2. Rebuild lineage and check the tiling.
        let topology = match self.rebuild(&description.shards) {
            Ok(t) => t,
            Err(e) => {
                error!(stream = %self.stream, error = %e, "topology rejected, skipping tick");
                return Ok(report.skipped(e.to_string()));
            }
        };
        report.shards = topology.len();
        report.leaves = topology.leaf_count();

        // Shards acted on last tick may still look open for one more refresh.
        let stale: Vec<ShardId> = std::mem::take(&mut self.in_flight)
            .into_iter()
            .filter(|id| topology.is_leaf(id))
            .collect();
        if !stale.is_empty() {
            debug!(stream = %self.stream, ?stale, "previous action not visible yet");
        }

        // 3. Measure.
        let input = self.fetch_bytes(Direction::Input).await?;
        let output = self.fetch_bytes(Direction::Output).await?;
        if input.is_none() && output.is_none() {
            warn!(stream = %self.stream, "metrics unavailable, holding shard count");
            return Ok(report);
        }
        // A missing direction reads as idle; it can still let the other
        // direction split but never justifies a merge.
        let complete = input.is_some() && output.is_some();
        for (direction, bytes) in [(Direction::Input, input), (Direction::Output, output)] {
            if bytes.is_none() {
                warn!(stream = %self.stream, %direction, "no datapoint, counting as zero utilization");
            }
        }

        let utilization = match self.estimator.measure(
            report.leaves,
            input.unwrap_or(0),
            output.unwrap_or(0),
        ) {
            Ok(u) => u,
            Err(e) => {
                error!(stream = %self.stream, error = %e, "capacity unavailable, skipping tick");
                return Ok(report.skipped(e.to_string()));
            }
        };
        report.utilization = Some(utilization);

        // 4. Decide.
        let merge_candidate = topology.merge_candidate().filter(|_| complete);
        let decision = self.engine.decide(&utilization, merge_candidate.is_some());
        report.decision = decision;

        info!(
            stream = %self.stream,
            status = %description.status,
            leaves = report.leaves,
            input_pct = utilization.input,
            output_pct = utilization.output,
            ?decision,
            "tick evaluated"
        );

        let action = match decision {
            ScaleDecision::NoAction => return Ok(report),
            ScaleDecision::SplitBiggest => {
                let Some(shard) = topology.biggest_leaf() else {
                    return Ok(report.skipped("no open shard to split"));
                };
                match Action::split(shard) {
                    Ok(a) => a,
                    Err(e) => {
                        warn!(stream = %self.stream, error = %e, "split skipped");
                        return Ok(report.skipped(e.to_string()));
                    }
                }
            }
            ScaleDecision::MergeSmallestWithNeighbor => match merge_candidate {
                Some((lower, upper)) => Action::merge(lower, upper),
                None => return Ok(report),
            },
        };
        report.action = Some(action.clone());

        if let Some(id) = stale.iter().find(|id| action.touches(id)) {
            info!(stream = %self.stream, shard = %id, "awaiting refresh before acting on shard again");
            return Ok(report.skipped(format!("shard {id} has an action in flight")));
        }

        if !act {
            report.outcome = TickOutcome::Planned;
            return Ok(report);
        }

        // 5. Act.
        let executor = ActionExecutor::new(&self.gateway, &self.stream, &topology, description.status)
            .with_dry_run(self.dry_run);
        let result = match &action {
            Action::Split { shard_id, .. } => match topology.get(shard_id) {
                Some(shard) => executor.execute_split(shard).await,
                None => return Ok(report.skipped(format!("shard {shard_id} vanished"))),
            },
            Action::Merge { lower, upper } => match (topology.get(lower), topology.get(upper)) {
                (Some(l), Some(u)) => executor.execute_merge(l, u).await,
                _ => return Ok(report.skipped(format!("shards {lower}/{upper} vanished"))),
            },
        };

        match result {
            Ok(outcome) => {
                if outcome == ActionOutcome::Issued {
                    self.in_flight = action.shard_ids();
                }
                report.outcome = outcome.into();
            }
            Err(ActionError::Gateway(e)) if e.is_fatal() => {
                error!(stream = %self.stream, error = %e, "stream gateway unreachable");
                return Err(e.into());
            }
            Err(ActionError::Gateway(e)) if e.is_throttle() => {
                warn!(stream = %self.stream, error = %e, "action throttled, not retrying this tick");
                report = report.skipped(e.to_string());
            }
            Err(e) => {
                warn!(stream = %self.stream, error = %e, "action failed");
                report = report.skipped(e.to_string());
            }
        }

        Ok(report)
    }

    fn rebuild(&self, shards: &[ShardDescriptor]) -> TopologyResult<Topology> {
        let mut topology = Topology::build(shards)?;
        topology.link_lineage()?;
        topology.check_coverage(self.hash_space)?;
        Ok(topology)
    }

    /// Bytes for one direction; non-fatal errors count as no datapoint.
    async fn fetch_bytes(&self, direction: Direction) -> ScaleResult<Option<u64>> {
        match self.metrics.bytes(direction, self.period_secs).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.is_fatal() => {
                error!(%direction, error = %e, "metrics gateway unreachable");
                Err(e.into())
            }
            Err(e) => {
                warn!(%direction, error = %e, "metrics fetch failed");
                Ok(None)
            }
        }
    }
}
