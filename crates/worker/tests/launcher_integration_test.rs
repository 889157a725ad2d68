use std::sync::Arc;
use std::time::Duration;

use batcher_config::{SimulatedTargetConfig, SimulatedWorkerConfig, SimulationConfig};
use batcher_core::{
    LaunchRequest, MonotonicClock, OperationKind, ProcessLauncher, TargetInspector, TaskStatus,
};
use batcher_infrastructure::{completion_channel, CompletionSubscriber, SimulatedCluster};
use batcher_worker::LocalProcessLauncher;

const CHANNEL_ID: u32 = 7;

fn cluster() -> Arc<SimulatedCluster> {
    Arc::new(SimulatedCluster::new(&SimulationConfig {
        time_scale: 1.0,
        capability: 50.0,
        jitter_ms: 0,
        workers: vec![SimulatedWorkerConfig {
            hostname: "home".to_string(),
            max_capacity: 64.0,
        }],
        targets: vec![SimulatedTargetConfig {
            name: "n00dles".to_string(),
            required_capability: 1.0,
            growth_rate: 25.0,
            max_available: 1000.0,
            min_defense: 1.0,
            base_hack_ms: 1000,
            initial_available_fraction: 0.5,
            initial_defense_offset: 0.0,
        }],
    }))
}

fn setup() -> (LocalProcessLauncher, CompletionSubscriber, Arc<SimulatedCluster>) {
    let cluster = cluster();
    let (publisher, subscriber) = completion_channel(CHANNEL_ID, 64);
    let launcher = LocalProcessLauncher::new(
        cluster.clone(),
        Arc::new(publisher),
        Arc::new(MonotonicClock::new()),
        50,
    );
    (launcher, subscriber, cluster)
}

fn grow_request(delay_ms: i64, channel_id: u32) -> LaunchRequest {
    LaunchRequest {
        task_id: "0badf00d".to_string(),
        batch_id: 4,
        target: "n00dles".to_string(),
        kind: OperationKind::Grow,
        worker: "home".to_string(),
        threads: 10,
        dispatch_delay_ms: delay_ms,
        expected_duration_ms: 3200,
        channel_id,
    }
}

#[tokio::test(start_paused = true)]
async fn test_operation_reports_full_lifecycle_on_channel() {
    let (launcher, mut subscriber, cluster) = setup();
    let before = cluster.snapshot("n00dles").await.unwrap();

    let handle = launcher.launch(&grow_request(200, CHANNEL_ID)).unwrap();
    assert!(handle.is_running());

    tokio::time::sleep(Duration::from_millis(4000)).await;
    assert!(!handle.is_running());

    let messages = subscriber.drain();
    let statuses: Vec<TaskStatus> = messages.iter().map(|m| m.status).collect();
    assert_eq!(
        statuses,
        vec![TaskStatus::Waiting, TaskStatus::Executing, TaskStatus::Completed]
    );

    let completed = &messages[2];
    assert_eq!(completed.id, "0badf00d");
    assert_eq!(completed.batch_id, 4);
    assert_eq!(completed.execute_observed_state, Some(before.defense_level));
    let elapsed = completed.end_time.unwrap() - completed.start_time;
    assert!((3400..3410).contains(&elapsed), "elapsed {elapsed}");

    let after = cluster.snapshot("n00dles").await.unwrap();
    assert!(after.available > before.available);
    assert!(after.defense_level > before.defense_level);
}

#[tokio::test(start_paused = true)]
async fn test_killed_operation_never_executes() {
    let (launcher, mut subscriber, cluster) = setup();
    let before = cluster.snapshot("n00dles").await.unwrap();

    let handle = launcher.launch(&grow_request(1000, CHANNEL_ID)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.kill();
    tokio::time::sleep(Duration::from_millis(5000)).await;

    assert!(!handle.is_running());
    let statuses: Vec<TaskStatus> = subscriber.drain().iter().map(|m| m.status).collect();
    assert_eq!(statuses, vec![TaskStatus::Waiting]);
    assert_eq!(cluster.snapshot("n00dles").await.unwrap(), before);
}

#[tokio::test]
async fn test_launch_rejects_foreign_channel() {
    let (launcher, _subscriber, _cluster) = setup();
    assert!(launcher.launch(&grow_request(0, CHANNEL_ID + 1)).is_err());
}
