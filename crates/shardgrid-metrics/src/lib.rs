//! shardgrid-metrics — turns raw byte counters into utilization.
//!
//! # Architecture
//!
//! ```text
//! MetricsGateway::bytes(direction, period)   (normalized by normalize_period)
//!        │
//!        ▼
//! CapacityEstimator
//!   ├── total_capacity() = leaf_count × per_shard(direction)
//!   └── utilization()    = bytes / total_capacity × 100
//! ```

pub mod capacity;
pub mod period;

pub use capacity::{CapacityError, CapacityEstimator, CapacityResult, Utilization};
pub use period::{normalize_period, METRIC_GRANULARITY_SECS};
