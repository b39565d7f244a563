//! Capacity estimator — converts byte counters into utilization percentages.
//!
//! Only open shards carry traffic, so capacity scales with the leaf count
//! of the current topology. Closed shards are never counted.

use serde::Serialize;
use shard_core::config::CapacityConfig;
use shard_core::Direction;
use thiserror::Error;
use tracing::trace;

pub type CapacityResult<T> = Result<T, CapacityError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapacityError {
    /// A live stream always has at least one open shard; zero means the
    /// refresh upstream went wrong.
    #[error("no {direction} capacity: {leaf_count} open shards at {per_shard} bytes each")]
    NoCapacity {
        direction: Direction,
        leaf_count: usize,
        per_shard: u64,
    },
}

/// Per-direction utilization for one metric window, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Utilization {
    pub input: f64,
    pub output: f64,
}

impl Utilization {
    pub fn get(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Input => self.input,
            Direction::Output => self.output,
        }
    }
}

/// Capacity constants for a stream.
#[derive(Debug, Clone)]
pub struct CapacityEstimator {
    capacity: CapacityConfig,
}

impl CapacityEstimator {
    pub fn new(capacity: CapacityConfig) -> Self {
        Self { capacity }
    }

    pub fn per_shard(&self, direction: Direction) -> u64 {
        self.capacity.per_shard(direction)
    }

    /// `leaf_count × per_shard(direction)`, widened so it cannot overflow.
    pub fn total_capacity(&self, direction: Direction, leaf_count: usize) -> CapacityResult<u128> {
        let per_shard = self.per_shard(direction);
        if leaf_count == 0 || per_shard == 0 {
            return Err(CapacityError::NoCapacity {
                direction,
                leaf_count,
                per_shard,
            });
        }
        Ok(leaf_count as u128 * per_shard as u128)
    }

    /// `period_bytes / total_capacity × 100`.
    pub fn utilization(
        &self,
        direction: Direction,
        leaf_count: usize,
        period_bytes: u64,
    ) -> CapacityResult<f64> {
        let total = self.total_capacity(direction, leaf_count)?;
        let pct = period_bytes as f64 / total as f64 * 100.0;
        trace!(%direction, leaf_count, period_bytes, %total, pct, "utilization computed");
        Ok(pct)
    }

    /// Utilization in both directions.
    pub fn measure(
        &self,
        leaf_count: usize,
        input_bytes: u64,
        output_bytes: u64,
    ) -> CapacityResult<Utilization> {
        Ok(Utilization {
            input: self.utilization(Direction::Input, leaf_count, input_bytes)?,
            output: self.utilization(Direction::Output, leaf_count, output_bytes)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator(input: u64, output: u64) -> CapacityEstimator {
        CapacityEstimator::new(CapacityConfig {
            input_per_shard: input,
            output_per_shard: output,
        })
    }

    #[test]
    fn total_scales_with_leaves() {
        let est = estimator(100, 200);
        assert_eq!(est.total_capacity(Direction::Input, 2), Ok(200));
        assert_eq!(est.total_capacity(Direction::Output, 3), Ok(600));
    }

    #[test]
    fn two_leaves_at_170_bytes_is_85_percent() {
        let est = estimator(100, 100);
        let pct = est.utilization(Direction::Input, 2, 170).unwrap();
        assert!((pct - 85.0).abs() < 1e-9, "got {pct}");
    }

    #[test]
    fn zero_leaves_has_no_capacity() {
        let est = estimator(100, 100);
        assert_eq!(
            est.utilization(Direction::Output, 0, 10),
            Err(CapacityError::NoCapacity {
                direction: Direction::Output,
                leaf_count: 0,
                per_shard: 100,
            })
        );
    }

    #[test]
    fn zero_per_shard_has_no_capacity() {
        let est = estimator(0, 100);
        assert!(est.utilization(Direction::Input, 4, 10).is_err());
        assert!(est.utilization(Direction::Output, 4, 10).is_ok());
    }

    #[test]
    fn utilization_is_monotonic_in_bytes() {
        let est = estimator(1024 * 1024, 2 * 1024 * 1024);
        for leaves in [1usize, 2, 5, 64] {
            let mut last = -1.0;
            for bytes in (0..=50u64).map(|i| i * 97_531) {
                let pct = est.utilization(Direction::Input, leaves, bytes).unwrap();
                assert!(pct >= last, "{bytes} bytes on {leaves} leaves dropped to {pct}");
                last = pct;
            }
        }
    }

    #[test]
    fn defaults_match_one_and_two_mebibytes() {
        let est = CapacityEstimator::new(CapacityConfig::default());
        assert_eq!(est.per_shard(Direction::Input), 1_048_576);
        assert_eq!(est.per_shard(Direction::Output), 2_097_152);

        let u = est.measure(1, 524_288, 524_288).unwrap();
        assert_eq!(u.get(Direction::Input), 50.0);
        assert_eq!(u.get(Direction::Output), 25.0);
    }
}
