//! Scaling decision engine.
//!
//! A pure function of the two utilizations, whether a merge candidate
//! exists, and the configured water marks. Growth is checked first.

use serde::Serialize;
use shard_core::config::ThresholdConfig;
use shard_core::Direction;
use shardgrid_metrics::Utilization;
use tracing::debug;

/// What the control loop should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDecision {
    /// Split the open shard with the widest hash range.
    SplitBiggest,
    /// Merge the narrowest open shard into its neighbor.
    MergeSmallestWithNeighbor,
    /// Leave the shard count alone.
    NoAction,
}

/// Threshold state machine over utilization percentages.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    thresholds: ThresholdConfig,
}

impl DecisionEngine {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    /// Any direction at or above its high water mark.
    pub fn above_hwm(&self, utilization: &Utilization) -> bool {
        Direction::ALL
            .iter()
            .any(|&d| utilization.get(d) >= self.thresholds.hwm(d))
    }

    /// Every direction at or below its low water mark.
    pub fn below_lwm(&self, utilization: &Utilization) -> bool {
        Direction::ALL
            .iter()
            .all(|&d| utilization.get(d) <= self.thresholds.lwm(d))
    }

    pub fn decide(&self, utilization: &Utilization, has_merge_candidate: bool) -> ScaleDecision {
        let decision = if self.above_hwm(utilization) {
            ScaleDecision::SplitBiggest
        } else if self.below_lwm(utilization) && has_merge_candidate {
            ScaleDecision::MergeSmallestWithNeighbor
        } else {
            ScaleDecision::NoAction
        };

        debug!(
            input_pct = utilization.input,
            output_pct = utilization.output,
            has_merge_candidate,
            ?decision,
            "scale decision"
        );
        decision
    }
}
