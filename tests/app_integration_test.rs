use std::time::Duration;

use batcher::app::Application;
use batcher::shutdown::ShutdownSignal;
use batcher_config::{AppConfig, SimulatedTargetConfig, SimulationConfig};

fn simulated_config(initial_available_fraction: f64, initial_defense_offset: f64) -> AppConfig {
    let mut config = AppConfig::default();
    config.observability.stats_enabled = false;
    config.simulation = SimulationConfig {
        time_scale: 1.0,
        jitter_ms: 0,
        targets: vec![SimulatedTargetConfig {
            name: "n00dles".to_string(),
            required_capability: 1.0,
            growth_rate: 25.0,
            max_available: 1000.0,
            min_defense: 1.0,
            base_hack_ms: 1000,
            initial_available_fraction,
            initial_defense_offset,
        }],
        ..SimulationConfig::default()
    };
    config
}

#[tokio::test(start_paused = true)]
async fn test_application_runs_batches_until_shutdown() {
    let app = Application::new(simulated_config(1.0, 0.0)).unwrap();
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(app.run(shutdown.subscribe()));

    tokio::time::sleep(Duration::from_secs(20)).await;
    shutdown.trigger();
    let stats = handle.await.unwrap().unwrap();

    assert_eq!(stats.runners.len(), 1);
    assert_eq!(stats.runners[0].target, "n00dles");
    assert!(stats.succeeded_total >= 1, "stats: {stats:?}");
    assert_eq!(stats.free_capacity, stats.total_capacity);
}

#[tokio::test(start_paused = true)]
async fn test_target_is_restored_before_normal_batches() {
    let app = Application::new(simulated_config(0.5, 1.0)).unwrap();
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(app.run(shutdown.subscribe()));

    tokio::time::sleep(Duration::from_secs(30)).await;
    shutdown.trigger();
    let stats = handle.await.unwrap().unwrap();

    let runner = &stats.runners[0];
    assert!(runner.restores >= 1, "stats: {stats:?}");
    assert!(runner.succeeded >= 1, "stats: {stats:?}");
}

#[tokio::test]
async fn test_overlapping_batch_windows_are_rejected() {
    let mut config = AppConfig::default();
    config.batch.new_batch_delay_ms = 2 * config.batch.task_spacing_ms;
    assert!(Application::new(config).is_err());
}
