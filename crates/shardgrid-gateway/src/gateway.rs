//! Collaborator traits consumed by the control loop.

use std::future::Future;

use shard_core::{Direction, StreamDescription};

use crate::error::GatewayResult;

/// Describe and reshard a single stream.
///
/// Implementations own their connection; it is acquired once at startup and
/// released on drop. Call timeouts are the implementation's concern.
pub trait StreamGateway: Send + Sync {
    /// Current status plus every shard the service still reports.
    fn describe(&self, stream: &str) -> impl Future<Output = GatewayResult<StreamDescription>> + Send;

    /// Split `shard_id` so the upper child starts at `split_point`.
    ///
    /// The split point is a decimal string so 128-bit keys survive any
    /// transport unchanged.
    fn split(
        &self,
        stream: &str,
        shard_id: &str,
        split_point: &str,
    ) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Merge two adjacent open shards, lower hash range first.
    fn merge(
        &self,
        stream: &str,
        lower_shard_id: &str,
        upper_shard_id: &str,
    ) -> impl Future<Output = GatewayResult<()>> + Send;
}

/// Throughput counters for the stream under control.
pub trait MetricsGateway: Send + Sync {
    /// Bytes moved in `direction` over the last `period_secs` seconds, or
    /// `None` when the collector has no datapoint for the window.
    fn bytes(
        &self,
        direction: Direction,
        period_secs: u64,
    ) -> impl Future<Output = GatewayResult<Option<u64>>> + Send;
}
