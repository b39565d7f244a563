//! In-memory simulated stream and metrics source.
//!
//! Loaded from a JSON fixture. Accepted split/merge requests are staged and
//! only published after a configurable number of `describe` calls, while
//! the stream reports UPDATING. This reproduces the staleness window the
//! control loop has to live with against a real service.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shard_core::{Direction, ShardDescriptor, StreamDescription, StreamStatus};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{MetricsGateway, StreamGateway};

/// Initial state of a simulated stream plus the byte counters it reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFixture {
    pub stream: String,
    #[serde(default = "default_status")]
    pub status: StreamStatus,
    pub shards: Vec<ShardDescriptor>,
    /// Input byte samples, one per metrics call; the last one repeats.
    #[serde(default)]
    pub input_bytes: Vec<u64>,
    /// Output byte samples, one per metrics call; the last one repeats.
    #[serde(default)]
    pub output_bytes: Vec<u64>,
}

fn default_status() -> StreamStatus {
    StreamStatus::Active
}

impl StreamFixture {
    pub fn new(stream: &str, shards: Vec<ShardDescriptor>) -> Self {
        Self {
            stream: stream.to_string(),
            status: StreamStatus::Active,
            shards,
            input_bytes: Vec::new(),
            output_bytes: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let fixture: StreamFixture = serde_json::from_str(&content)?;
        Ok(fixture)
    }
}

/// A split or merge call as received by the simulated service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReshardRequest {
    Split { shard_id: String, split_point: String },
    Merge { lower: String, upper: String },
}

/// Knobs for the simulated service's consistency behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimOptions {
    /// Describes that still return the old shard list after a request.
    pub visibility_lag: u32,
    /// Report UPDATING while a change is staged. When false the stream stays
    /// ACTIVE but serves stale shards, like a lagging read replica.
    pub report_updating: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            visibility_lag: 1,
            report_updating: true,
        }
    }
}

struct Staged {
    shards: Vec<ShardDescriptor>,
    describes_left: u32,
}

struct SimState {
    name: String,
    status: StreamStatus,
    shards: Vec<ShardDescriptor>,
    staged: Option<Staged>,
    options: SimOptions,
    next_shard: u64,
    throttle_budget: u32,
    severed: bool,
    requests: Vec<ReshardRequest>,
}

impl SimState {
    fn check(&self, stream: &str) -> GatewayResult<()> {
        if self.severed {
            return Err(GatewayError::Connection("simulated endpoint unreachable".to_string()));
        }
        if stream != self.name {
            return Err(GatewayError::NotFound(format!("stream {stream}")));
        }
        Ok(())
    }

    /// Gate shared by split and merge: throttling, then one change at a time.
    fn admit(&mut self) -> GatewayResult<()> {
        if self.throttle_budget > 0 {
            self.throttle_budget -= 1;
            return Err(GatewayError::Throttled(format!(
                "rate exceeded for stream {}",
                self.name
            )));
        }
        if self.status != StreamStatus::Active || self.staged.is_some() {
            return Err(GatewayError::InvalidRequest(format!(
                "stream {} is {} with a change in progress",
                self.name, self.status
            )));
        }
        Ok(())
    }

    fn open_shard(&self, id: &str) -> GatewayResult<(u128, u128)> {
        let shard = self
            .shards
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| GatewayError::NotFound(format!("shard {id}")))?;
        let closed = self.shards.iter().any(|s| {
            s.parent_id.as_deref() == Some(id) || s.adjacent_parent_id.as_deref() == Some(id)
        });
        if closed {
            return Err(GatewayError::InvalidRequest(format!("shard {id} is closed")));
        }
        let start = parse_key(&shard.starting_hash)?;
        let end = parse_key(&shard.ending_hash)?;
        Ok((start, end))
    }

    fn next_id(&mut self) -> String {
        let id = format!("shardId-{:012}", self.next_shard);
        self.next_shard += 1;
        id
    }

    fn stage(&mut self, shards: Vec<ShardDescriptor>) {
        self.staged = Some(Staged {
            shards,
            describes_left: self.options.visibility_lag,
        });
        if self.options.report_updating {
            self.status = StreamStatus::Updating;
        }
    }
}

fn parse_key(raw: &str) -> GatewayResult<u128> {
    raw.parse::<u128>()
        .map_err(|e| GatewayError::Service(format!("stored hash key {raw:?}: {e}")))
}

/// Fixture-backed [`StreamGateway`]. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SimulatedStream {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedStream {
    /// Open the simulated stream named `stream` with default options.
    pub fn connect(stream: &str, fixture: &StreamFixture) -> GatewayResult<Self> {
        Self::connect_with(stream, fixture, SimOptions::default())
    }

    pub fn connect_with(
        stream: &str,
        fixture: &StreamFixture,
        options: SimOptions,
    ) -> GatewayResult<Self> {
        if stream != fixture.stream {
            return Err(GatewayError::NotFound(format!(
                "stream {stream} (fixture provides {})",
                fixture.stream
            )));
        }
        info!(
            stream,
            shards = fixture.shards.len(),
            lag = options.visibility_lag,
            "simulated stream connected"
        );
        Ok(Self {
            inner: Arc::new(Mutex::new(SimState {
                name: fixture.stream.clone(),
                status: fixture.status,
                shards: fixture.shards.clone(),
                staged: None,
                options,
                next_shard: fixture.shards.len() as u64,
                throttle_budget: 0,
                severed: false,
                requests: Vec::new(),
            })),
        })
    }

    /// Reject the next `n` split/merge calls as throttled.
    pub async fn throttle_next(&self, n: u32) {
        self.inner.lock().await.throttle_budget = n;
    }

    /// Make every later call fail with a connection error.
    pub async fn sever(&self) {
        self.inner.lock().await.severed = true;
    }

    pub async fn set_status(&self, status: StreamStatus) {
        self.inner.lock().await.status = status;
    }

    /// Every split/merge call received so far, accepted or not.
    pub async fn requests(&self) -> Vec<ReshardRequest> {
        self.inner.lock().await.requests.clone()
    }

    /// Published shard list, ignoring any staged change.
    pub async fn published(&self) -> Vec<ShardDescriptor> {
        self.inner.lock().await.shards.clone()
    }
}

impl StreamGateway for SimulatedStream {
    async fn describe(&self, stream: &str) -> GatewayResult<StreamDescription> {
        let mut guard = self.inner.lock().await;
        guard.check(stream)?;
        let state = &mut *guard;

        let publish = match state.staged.as_mut() {
            Some(staged) if staged.describes_left == 0 => true,
            Some(staged) => {
                staged.describes_left -= 1;
                false
            }
            None => false,
        };
        if publish && let Some(staged) = state.staged.take() {
            state.shards = staged.shards;
            state.status = StreamStatus::Active;
            debug!(stream, shards = state.shards.len(), "staged change published");
        }

        Ok(StreamDescription {
            status: state.status,
            shards: state.shards.clone(),
        })
    }

    async fn split(&self, stream: &str, shard_id: &str, split_point: &str) -> GatewayResult<()> {
        let mut state = self.inner.lock().await;
        state.check(stream)?;
        state.requests.push(ReshardRequest::Split {
            shard_id: shard_id.to_string(),
            split_point: split_point.to_string(),
        });
        state.admit()?;

        let (start, end) = state.open_shard(shard_id)?;
        let point: u128 = split_point
            .parse()
            .map_err(|e| GatewayError::InvalidRequest(format!("split point {split_point:?}: {e}")))?;
        if point <= start || point > end {
            return Err(GatewayError::InvalidRequest(format!(
                "split point {point} outside ({start}, {end}]"
            )));
        }

        let lower_id = state.next_id();
        let upper_id = state.next_id();
        let mut shards = state.shards.clone();
        shards.push(ShardDescriptor::new(&lower_id, start, point - 1).with_parent(shard_id));
        shards.push(ShardDescriptor::new(&upper_id, point, end).with_parent(shard_id));
        state.stage(shards);

        debug!(stream, shard_id, split_point, %lower_id, %upper_id, "simulated split accepted");
        Ok(())
    }

    async fn merge(&self, stream: &str, lower_shard_id: &str, upper_shard_id: &str) -> GatewayResult<()> {
        let mut state = self.inner.lock().await;
        state.check(stream)?;
        state.requests.push(ReshardRequest::Merge {
            lower: lower_shard_id.to_string(),
            upper: upper_shard_id.to_string(),
        });
        state.admit()?;

        let (lower_start, lower_end) = state.open_shard(lower_shard_id)?;
        let (upper_start, upper_end) = state.open_shard(upper_shard_id)?;
        if lower_end.checked_add(1) != Some(upper_start) {
            return Err(GatewayError::InvalidRequest(format!(
                "shards {lower_shard_id} and {upper_shard_id} are not adjacent"
            )));
        }

        let merged_id = state.next_id();
        let mut shards = state.shards.clone();
        shards.push(
            ShardDescriptor::new(&merged_id, lower_start, upper_end)
                .with_parent(lower_shard_id)
                .with_adjacent_parent(upper_shard_id),
        );
        state.stage(shards);

        debug!(stream, lower_shard_id, upper_shard_id, %merged_id, "simulated merge accepted");
        Ok(())
    }
}

struct MetricsState {
    input: VecDeque<u64>,
    output: VecDeque<u64>,
    periods: Vec<u64>,
}

/// Fixture-backed [`MetricsGateway`] replaying byte samples.
#[derive(Clone)]
pub struct SimulatedMetrics {
    inner: Arc<Mutex<MetricsState>>,
}

impl SimulatedMetrics {
    pub fn from_fixture(fixture: &StreamFixture) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                input: fixture.input_bytes.iter().copied().collect(),
                output: fixture.output_bytes.iter().copied().collect(),
                periods: Vec::new(),
            })),
        }
    }

    /// Report a fixed value (or no datapoint) from now on.
    pub async fn set_bytes(&self, direction: Direction, bytes: Option<u64>) {
        let mut state = self.inner.lock().await;
        let samples = match direction {
            Direction::Input => &mut state.input,
            Direction::Output => &mut state.output,
        };
        samples.clear();
        samples.extend(bytes);
    }

    /// Periods requested so far, in call order.
    pub async fn periods(&self) -> Vec<u64> {
        self.inner.lock().await.periods.clone()
    }
}

impl MetricsGateway for SimulatedMetrics {
    async fn bytes(&self, direction: Direction, period_secs: u64) -> GatewayResult<Option<u64>> {
        let mut state = self.inner.lock().await;
        state.periods.push(period_secs);
        let samples = match direction {
            Direction::Input => &mut state.input,
            Direction::Output => &mut state.output,
        };
        let value = if samples.len() > 1 {
            samples.pop_front()
        } else {
            samples.front().copied()
        };
        Ok(value)
    }
}
