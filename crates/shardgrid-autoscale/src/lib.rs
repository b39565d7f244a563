//! shardgrid-autoscale — utilization-driven shard splitting and merging.
//!
//! Refreshes the stream topology, converts byte counters into utilization,
//! and reshards one step at a time. Cancellation comes from a
//! `watch::Receiver<bool>`, as with every other background loop.
//!
//! # Scaling Algorithm
//!
//! ```text
//! utilization(d) = bytes(d, period) / (leaves × per_shard(d)) × 100
//!
//! if input >= input_hwm or output >= output_hwm:
//!     SplitBiggest              // widest leaf, split at its midpoint
//!
//! if input <= input_lwm and output <= output_lwm and smallest leaf has a neighbor:
//!     MergeSmallestWithNeighbor
//!
//! else NoAction
//! ```
//!
//! A stream that is not ACTIVE defers the action for 60 seconds. Shards
//! acted on in one tick are left alone in the next if the refresh still
//! shows them open.

pub mod decision;
pub mod error;
pub mod executor;
pub mod scaler;

pub use decision::{DecisionEngine, ScaleDecision};
pub use error::{ScaleError, ScaleResult};
pub use executor::{Action, ActionError, ActionExecutor, ActionOutcome, NOT_ACTIVE_BACKOFF};
pub use scaler::{ControlLoop, TickOutcome, TickReport};
