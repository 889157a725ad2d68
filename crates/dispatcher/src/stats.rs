//! 调度统计
//!
//! 吞吐量、各运行器计数与调度循环漂移，仅用于诊断。

use serde::Serialize;
use tracing::info;

use crate::batch_runner::BatchRunner;

/// 调度tick间隔相对配置值的偏差
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TickDriftStats {
    pub count: u64,
    pub mean_ms: f64,
    pub max_ms: i64,
}

/// 单个运行器的统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerStats {
    pub target: String,
    pub max_concurrent_batches: usize,
    pub initializing: bool,
    pub running: usize,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub resets: u64,
    pub restores: u64,
}

impl From<&BatchRunner> for RunnerStats {
    fn from(runner: &BatchRunner) -> Self {
        let counters = runner.counters();
        Self {
            target: runner.target().to_string(),
            max_concurrent_batches: runner.spec().max_concurrent_batches,
            initializing: runner.is_initializing(),
            running: runner.running_count(),
            succeeded: counters.succeeded,
            failed: counters.failed,
            cancelled: counters.cancelled,
            resets: counters.resets,
            restores: counters.restores,
        }
    }
}

/// 调度器统计快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub uptime_ms: i64,
    pub succeeded_total: u64,
    pub succeeded_per_minute: f64,
    pub runners: Vec<RunnerStats>,
    pub tick_drift: TickDriftStats,
    pub total_capacity: f64,
    pub free_capacity: f64,
    pub pending_targets: usize,
}

impl SchedulerStats {
    pub fn log(&self) {
        info!(
            uptime_s = self.uptime_ms / 1000,
            succeeded = self.succeeded_total,
            per_minute = self.succeeded_per_minute,
            free_capacity = self.free_capacity,
            total_capacity = self.total_capacity,
            pending_targets = self.pending_targets,
            "调度统计"
        );
        for runner in &self.runners {
            info!(
                "  {}: running={} succeeded={} failed={} cancelled={} resets={}{}",
                runner.target,
                runner.running,
                runner.succeeded,
                runner.failed,
                runner.cancelled,
                runner.resets,
                if runner.initializing { " (初始化中)" } else { "" }
            );
        }
        info!(
            "  tick漂移: count={} mean={:.1}ms max={}ms",
            self.tick_drift.count, self.tick_drift.mean_ms, self.tick_drift.max_ms
        );
    }
}

/// 累积tick漂移并控制统计输出节奏
#[derive(Debug, Clone)]
pub struct StatsTracker {
    started_at: i64,
    tick_interval_ms: i64,
    report_interval_ms: i64,
    last_report_at: i64,
    drift_count: u64,
    drift_total_ms: i64,
    drift_max_ms: i64,
}

impl StatsTracker {
    pub fn new(started_at: i64, tick_interval_ms: i64, report_interval_ms: i64) -> Self {
        Self {
            started_at,
            tick_interval_ms,
            report_interval_ms,
            last_report_at: started_at,
            drift_count: 0,
            drift_total_ms: 0,
            drift_max_ms: 0,
        }
    }

    /// 记录两次tick之间的实际间隔
    pub fn record_tick(&mut self, observed_interval_ms: i64) {
        let drift = (observed_interval_ms - self.tick_interval_ms).max(0);
        self.drift_count += 1;
        self.drift_total_ms += drift;
        self.drift_max_ms = self.drift_max_ms.max(drift);
    }

    pub fn tick_drift(&self) -> TickDriftStats {
        let mean_ms = if self.drift_count == 0 {
            0.0
        } else {
            self.drift_total_ms as f64 / self.drift_count as f64
        };
        TickDriftStats {
            count: self.drift_count,
            mean_ms,
            max_ms: self.drift_max_ms,
        }
    }

    pub fn uptime_ms(&self, now: i64) -> i64 {
        (now - self.started_at).max(0)
    }

    /// 到达输出间隔时返回 true 并重新计时
    pub fn should_report(&mut self, now: i64) -> bool {
        if now - self.last_report_at < self.report_interval_ms {
            return false;
        }
        self.last_report_at = now;
        true
    }

    pub fn snapshot(
        &self,
        now: i64,
        runners: &[BatchRunner],
        total_capacity: f64,
        free_capacity: f64,
        pending_targets: usize,
    ) -> SchedulerStats {
        let runners: Vec<RunnerStats> = runners.iter().map(RunnerStats::from).collect();
        let succeeded_total = runners.iter().map(|r| r.succeeded).sum();
        let uptime_ms = self.uptime_ms(now);
        let succeeded_per_minute = if uptime_ms == 0 {
            0.0
        } else {
            succeeded_total as f64 * 60_000.0 / uptime_ms as f64
        };

        SchedulerStats {
            uptime_ms,
            succeeded_total,
            succeeded_per_minute,
            runners,
            tick_drift: self.tick_drift(),
            total_capacity,
            free_capacity,
            pending_targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_drift_accumulates() {
        let mut tracker = StatsTracker::new(0, 100, 10_000);
        assert_eq!(tracker.tick_drift(), TickDriftStats::default());

        tracker.record_tick(100);
        tracker.record_tick(130);
        tracker.record_tick(95);
        tracker.record_tick(150);

        let drift = tracker.tick_drift();
        assert_eq!(drift.count, 4);
        assert_eq!(drift.max_ms, 50);
        assert!((drift.mean_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_interval() {
        let mut tracker = StatsTracker::new(1_000, 100, 10_000);
        assert!(!tracker.should_report(10_999));
        assert!(tracker.should_report(11_000));
        assert!(!tracker.should_report(20_000));
        assert!(tracker.should_report(21_000));
    }

    #[test]
    fn test_snapshot_without_runners() {
        let tracker = StatsTracker::new(0, 100, 10_000);
        let stats = tracker.snapshot(60_000, &[], 1024.0, 512.0, 3);
        assert_eq!(stats.uptime_ms, 60_000);
        assert_eq!(stats.succeeded_total, 0);
        assert_eq!(stats.succeeded_per_minute, 0.0);
        assert_eq!(stats.pending_targets, 3);
    }
}
