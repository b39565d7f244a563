//! End-to-end control loop runs against the demo fixture.

use std::path::PathBuf;
use std::time::Duration;

use shard_core::ShardConfig;
use shardgrid_autoscale::{Action, ControlLoop, ScaleDecision, ScaleError, TickOutcome};
use shardgrid_gateway::{ReshardRequest, SimulatedMetrics, SimulatedStream, StreamFixture};
use shardgrid_topology::{HashSpace, Topology};
use tokio::sync::watch;

const LOWEST: &str = "shardId-000000000000";
const QUARTER: u128 = 1 << 126;

fn demo_fixture() -> StreamFixture {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/events/stream.json");
    StreamFixture::from_file(&path).unwrap()
}

fn setup(config: &ShardConfig) -> (ControlLoop<SimulatedStream, SimulatedMetrics>, SimulatedStream) {
    let fixture = demo_fixture();
    let stream = SimulatedStream::connect(&config.stream.name, &fixture).unwrap();
    let metrics = SimulatedMetrics::from_fixture(&fixture);
    (ControlLoop::new(config, stream.clone(), metrics), stream)
}

fn expected_requests() -> Vec<ReshardRequest> {
    vec![
        ReshardRequest::Split {
            shard_id: LOWEST.into(),
            split_point: (QUARTER / 2).to_string(),
        },
        ReshardRequest::Merge {
            lower: "shardId-000000000004".into(),
            upper: "shardId-000000000005".into(),
        },
        ReshardRequest::Merge {
            lower: "shardId-000000000006".into(),
            upper: "shardId-000000000001".into(),
        },
    ]
}

#[tokio::test]
async fn split_then_merge_back_under_falling_load() {
    let config = ShardConfig::scaffold("events", None);
    let (mut control, stream) = setup(&config);

    // 3.6 MB over four 1 MiB shards: split the lowest quarter.
    let first = control.tick().await.unwrap();
    assert_eq!(first.decision, ScaleDecision::SplitBiggest);
    assert_eq!(first.outcome, TickOutcome::Issued);

    // Still UPDATING with the old shard list; the split target is in flight.
    let second = control.tick().await.unwrap();
    assert_eq!(second.status, Some(shard_core::StreamStatus::Updating));
    assert_eq!(second.leaves, 4);
    assert!(matches!(second.outcome, TickOutcome::Skipped { .. }));

    // Children published: five leaves bring utilization under the HWM.
    let third = control.tick().await.unwrap();
    assert_eq!(third.leaves, 5);
    assert_eq!(third.decision, ScaleDecision::NoAction);

    let published = stream.published().await;
    let mut topology = Topology::build(&published).unwrap();
    topology.link_lineage().unwrap();
    topology.check_coverage(HashSpace::default()).unwrap();
    let parent = topology.get(LOWEST).unwrap();
    assert!(!topology.is_leaf(LOWEST));
    let children: Vec<_> = parent.children.iter().map(String::as_str).collect();
    assert_eq!(children, vec!["shardId-000000000004", "shardId-000000000005"]);
    let lower = topology.get("shardId-000000000004").unwrap();
    let upper = topology.get("shardId-000000000005").unwrap();
    assert!(lower.precedes(upper));
    assert_eq!((lower.starting_hash, upper.ending_hash), (0, QUARTER - 1));

    assert_eq!(control.tick().await.unwrap().decision, ScaleDecision::NoAction);

    // Load drops below both LWMs: merge the two narrow children.
    let fifth = control.tick().await.unwrap();
    assert_eq!(fifth.decision, ScaleDecision::MergeSmallestWithNeighbor);
    assert_eq!(
        fifth.action,
        Some(Action::Merge {
            lower: "shardId-000000000004".into(),
            upper: "shardId-000000000005".into(),
        })
    );
    assert_eq!(fifth.outcome, TickOutcome::Issued);

    assert!(matches!(control.tick().await.unwrap().outcome, TickOutcome::Skipped { .. }));

    // Back to four leaves, all of equal width: the lowest merges upward.
    let seventh = control.tick().await.unwrap();
    assert_eq!(seventh.leaves, 4);
    assert_eq!(seventh.outcome, TickOutcome::Issued);

    assert_eq!(stream.requests().await, expected_requests());
}

#[tokio::test(start_paused = true)]
async fn run_reshards_on_schedule_until_shutdown() {
    let config = ShardConfig::scaffold("events", None);
    let (mut control, stream) = setup(&config);

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { control.run(rx).await });

    // Seven ticks, 60 seconds apart.
    tokio::time::sleep(Duration::from_secs(390)).await;
    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(stream.requests().await, expected_requests());
}

#[tokio::test(start_paused = true)]
async fn dry_run_leaves_stream_untouched() {
    let mut config = ShardConfig::scaffold("events", None);
    config.controller.dry_run = true;
    let (mut control, stream) = setup(&config);
    let before = stream.published().await;

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { control.run(rx).await });

    tokio::time::sleep(Duration::from_secs(390)).await;
    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert!(stream.requests().await.is_empty());
    assert_eq!(stream.published().await, before);
}

#[tokio::test(start_paused = true)]
async fn lost_connection_ends_run() {
    let config = ShardConfig::scaffold("events", None);
    let (mut control, stream) = setup(&config);

    let (_tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { control.run(rx).await });

    tokio::time::sleep(Duration::from_secs(90)).await;
    stream.sever().await;

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, ScaleError::Gateway(ref e) if e.is_fatal()));
    assert_eq!(stream.requests().await.len(), 1);
}
