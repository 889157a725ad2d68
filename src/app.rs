use std::sync::Arc;

use anyhow::{Context, Result};
use batcher_config::AppConfig;
use batcher_core::{Clock, MonotonicClock};
use batcher_dispatcher::{Scheduler, SchedulerDeps, SchedulerStats};
use batcher_infrastructure::{completion_channel, SchedulerMetrics, SimulatedCluster};
use batcher_worker::LocalProcessLauncher;
use tokio::sync::broadcast;
use tracing::info;

/// 调度器使用的完成通道编号
pub const COMPLETION_CHANNEL_ID: u32 = 1;

/// 主应用程序：模拟集群 + 本地远程操作 + 调度器
pub struct Application {
    scheduler: Scheduler,
}

impl Application {
    pub fn new(config: AppConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        Self::with_clock(config, clock)
    }

    /// 使用指定时钟装配所有组件
    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        info!(
            "初始化应用程序: {} 个模拟Worker, {} 个模拟目标, 计划策略 {}",
            config.simulation.workers.len(),
            config.simulation.targets.len(),
            config.batch.plan_strategy
        );

        let cluster = Arc::new(SimulatedCluster::new(&config.simulation));
        let (publisher, subscriber) =
            completion_channel(COMPLETION_CHANNEL_ID, config.scheduler.channel_capacity);

        let launcher = Arc::new(LocalProcessLauncher::new(
            cluster.clone(),
            Arc::new(publisher),
            clock.clone(),
            config.operation.drift_tolerance_ms,
        ));

        let deps = SchedulerDeps {
            inspector: cluster.clone(),
            inventory: cluster.clone(),
            estimator: cluster,
            launcher,
            clock,
        };
        let scheduler = Scheduler::new(&config, deps, subscriber, Arc::new(SchedulerMetrics::new()))
            .context("创建调度器失败")?;

        Ok(Self { scheduler })
    }

    /// 运行调度循环直到收到关闭信号，返回最终统计
    pub async fn run(mut self, shutdown_rx: broadcast::Receiver<()>) -> Result<SchedulerStats> {
        self.scheduler
            .init()
            .await
            .context("调度器初始化失败")?;
        self.scheduler
            .run(shutdown_rx)
            .await
            .context("调度器运行失败")?;

        let stats = self.scheduler.report();
        stats.log();
        Ok(stats)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
