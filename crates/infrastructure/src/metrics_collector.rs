//! 调度器指标采集
//!
//! 通过 `metrics` 门面记录；未安装 recorder 时所有调用均为空操作。

use batcher_core::BatchStatus;
use metrics::{counter, gauge, histogram, Gauge, Histogram};
use tracing::debug;

/// 调度器指标采集器
pub struct SchedulerMetrics {
    free_capacity: Gauge,
    total_capacity: Gauge,
    active_batches: Gauge,
    active_runners: Gauge,
    tick_duration: Histogram,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self {
            free_capacity: gauge!("batcher_free_capacity"),
            total_capacity: gauge!("batcher_total_capacity"),
            active_batches: gauge!("batcher_active_batches"),
            active_runners: gauge!("batcher_active_runners"),
            tick_duration: histogram!("batcher_tick_duration_seconds"),
        }
    }

    /// 记录批次启动
    pub fn record_batch_started(&self, target: &str) {
        counter!("batcher_batches_started_total", "target" => target.to_string()).increment(1);
    }

    /// 记录批次结束，按最终状态计数
    pub fn record_batch_finished(&self, target: &str, status: BatchStatus) {
        let name = match status {
            BatchStatus::Success => "batcher_batches_succeeded_total",
            BatchStatus::Failed => "batcher_batches_failed_total",
            BatchStatus::Cancelled => "batcher_batches_cancelled_total",
            BatchStatus::NotStarted | BatchStatus::Running => return,
        };
        counter!(name, "target" => target.to_string()).increment(1);
    }

    /// 记录批次运行器重置
    pub fn record_runner_reset(&self, target: &str) {
        counter!("batcher_runner_resets_total", "target" => target.to_string()).increment(1);
    }

    /// 记录无法路由的完成事件
    pub fn record_unroutable_event(&self, target: &str) {
        counter!("batcher_unroutable_events_total", "target" => target.to_string()).increment(1);
    }

    /// 更新容量
    pub fn update_capacity(&self, free: f64, total: f64) {
        self.free_capacity.set(free);
        self.total_capacity.set(total);
    }

    pub fn update_active(&self, runners: usize, batches: usize) {
        self.active_runners.set(runners as f64);
        self.active_batches.set(batches as f64);
    }

    /// 记录一次调度tick的耗时
    pub fn record_tick_duration(&self, duration_seconds: f64) {
        self.tick_duration.record(duration_seconds);
        debug!(duration_seconds = duration_seconds, "调度tick完成");
    }
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
