//! shardgrid-gateway — the two remote collaborators of the control loop.
//!
//! - **`StreamGateway`** describes a stream and issues split/merge requests.
//! - **`MetricsGateway`** reports byte counters for a time window.
//!
//! Both are traits so the loop can run against any backend. The `memory`
//! module provides a fixture-backed simulation of both, with the same
//! eventual consistency a real service shows: an accepted request puts the
//! stream into UPDATING and the new shards only appear on a later describe.

pub mod error;
pub mod gateway;
pub mod memory;

pub use error::{GatewayError, GatewayResult};
pub use gateway::{MetricsGateway, StreamGateway};
pub use memory::{ReshardRequest, SimulatedMetrics, SimulatedStream, StreamFixture};
