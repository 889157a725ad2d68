use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use batcher_config::{AppConfig, ConfigValidator, SchedulerConfig};
use batcher_core::{
    Clock, CompletionMessage, ProcessLauncher, RequirementEstimator, SchedulerError,
    SchedulerResult, TargetInspector, TargetProfile, TargetSnapshot, WorkerInventory,
};
use batcher_infrastructure::{CompletionSubscriber, SchedulerMetrics};
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::batch_runner::{BatchRunner, DispatchContext, RunnerSettings, RunnerSpec};
use crate::execution_plan::{ExecutionPlanBuilder, PlanSettings};
use crate::stats::{SchedulerStats, StatsTracker};
use crate::target_queue::TargetQueue;
use crate::worker_pool::WorkerPool;

/// 调度器依赖的外部协作者
#[derive(Clone)]
pub struct SchedulerDeps {
    pub inspector: Arc<dyn TargetInspector>,
    pub inventory: Arc<dyn WorkerInventory>,
    pub estimator: Arc<dyn RequirementEstimator>,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub clock: Arc<dyn Clock>,
}

/// 单次tick的结果摘要
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub routed: usize,
    pub unroutable: usize,
    pub admitted_targets: usize,
    pub started_batches: usize,
}

/// 顶层调度器：容量池、目标分配、完成通道路由
pub struct Scheduler {
    config: SchedulerConfig,
    intensity: f64,
    new_batch_delay_ms: i64,
    max_batches_per_target: usize,
    stats_enabled: bool,
    diagnostics: bool,
    deps: SchedulerDeps,
    subscriber: CompletionSubscriber,
    plan_builder: ExecutionPlanBuilder,
    runner_settings: RunnerSettings,
    metrics: Arc<SchedulerMetrics>,
    pool: WorkerPool,
    runners: Vec<BatchRunner>,
    queue: TargetQueue,
    stats: StatsTracker,
    last_tick_at: Option<i64>,
    initialized: bool,
}

impl Scheduler {
    pub fn new(
        config: &AppConfig,
        deps: SchedulerDeps,
        subscriber: CompletionSubscriber,
        metrics: Arc<SchedulerMetrics>,
    ) -> SchedulerResult<Self> {
        config
            .validate()
            .map_err(|e| SchedulerError::config_error(e.to_string()))?;
        let runner_settings = RunnerSettings::from_config(&config.batch);
        let plan_builder =
            ExecutionPlanBuilder::new(PlanSettings::from(&config.batch), deps.estimator.clone());
        let now = deps.clock.now_ms();
        let stats = StatsTracker::new(
            now,
            config.scheduler.tick_interval_ms as i64,
            config.scheduler.stats_interval_ms as i64,
        );

        Ok(Self {
            config: config.scheduler.clone(),
            intensity: config.batch.intensity,
            new_batch_delay_ms: config.batch.new_batch_delay_ms,
            max_batches_per_target: config.batch.max_batches_per_target,
            stats_enabled: config.observability.stats_enabled,
            diagnostics: config.observability.diagnostics,
            deps,
            subscriber,
            plan_builder,
            runner_settings,
            metrics,
            pool: WorkerPool::new(),
            runners: Vec::new(),
            queue: TargetQueue::new(),
            stats,
            last_tick_at: None,
            initialized: false,
        })
    }

    /// 获取初始节点快照并清空完成通道
    pub async fn init(&mut self) -> SchedulerResult<()> {
        let workers = self.deps.inventory.list_workers().await?;
        self.pool.refresh(&workers);
        let cleared = self.subscriber.clear();
        if cleared > 0 {
            debug!("清理完成通道中的 {} 条旧消息", cleared);
        }
        self.initialized = true;
        info!(
            "调度器初始化完成: {} 个Worker, 总容量 {}",
            self.pool.len(),
            self.pool.total_capacity()
        );
        Ok(())
    }

    /// 执行一次调度tick
    pub async fn tick(&mut self) -> SchedulerResult<TickReport> {
        if !self.initialized {
            self.init().await?;
        }
        let now = self.deps.clock.now_ms();
        if let Some(last) = self.last_tick_at {
            self.stats.record_tick(now - last);
        }
        self.last_tick_at = Some(now);

        let mut report = TickReport::default();
        self.refresh_workers().await?;
        self.refresh_targets().await?;

        let (routed, unroutable) = self.route_completions(now);
        report.routed = routed;
        report.unroutable = unroutable;

        let targets: Vec<String> = self
            .runners
            .iter()
            .map(|r| r.target().to_string())
            .collect();
        let snapshots = fetch_snapshots(self.deps.inspector.as_ref(), &targets).await;
        self.maintain_runners(&snapshots, now);

        if self.admit_target(now).await {
            report.admitted_targets = 1;
        }
        report.started_batches = self.admit_batches(&snapshots, now);

        self.metrics
            .update_capacity(self.pool.free_capacity(), self.pool.total_capacity());
        self.metrics
            .update_active(self.runners.len(), self.active_batch_count());

        if self.diagnostics {
            debug!(
                routed = report.routed,
                unroutable = report.unroutable,
                started = report.started_batches,
                runners = self.runners.len(),
                free_capacity = self.pool.free_capacity(),
                "tick诊断"
            );
        }
        if self.stats_enabled && self.stats.should_report(now) {
            self.stats(now).log();
        }
        Ok(report)
    }

    async fn refresh_workers(&mut self) -> SchedulerResult<()> {
        let workers = self.deps.inventory.list_workers().await?;
        self.pool.refresh(&workers);
        Ok(())
    }

    async fn refresh_targets(&mut self) -> SchedulerResult<()> {
        let profiles = self.deps.inspector.list_targets().await?;
        let capability = self.deps.inspector.capability().await?;
        let assigned: HashSet<String> = self
            .runners
            .iter()
            .map(|r| r.target().to_string())
            .collect();
        self.queue.refresh(
            profiles,
            capability,
            self.config.capability_threshold_divisor,
            &assigned,
        );
        Ok(())
    }

    /// 取出完成通道中的全部消息并交给目标对应的运行器
    pub fn route_completions(&mut self, now: i64) -> (usize, usize) {
        let messages = self.subscriber.drain();
        let mut routed = 0;
        let mut unroutable = 0;
        for message in messages {
            if self.route(&message, now) {
                routed += 1;
            } else {
                unroutable += 1;
            }
        }
        (routed, unroutable)
    }

    fn route(&mut self, message: &CompletionMessage, now: i64) -> bool {
        let Some(runner) = self
            .runners
            .iter_mut()
            .find(|r| r.target() == message.target)
        else {
            warn!(
                "无法路由的完成事件: 目标 {} 没有运行器 (task {}, batch {})",
                message.target, message.id, message.batch_id
            );
            self.metrics.record_unroutable_event(&message.target);
            return false;
        };

        if !runner.update_batch_status(message, now) {
            trace!(
                target = %message.target,
                batch_id = message.batch_id,
                task_id = %message.id,
                "忽略已移除批次的完成事件"
            );
        }
        true
    }

    fn maintain_runners(&mut self, snapshots: &[Option<TargetSnapshot>], now: i64) {
        let budget = self.batch_budget();
        let mut ctx = DispatchContext::new(
            &mut self.pool,
            self.deps.launcher.as_ref(),
            self.subscriber.channel_id(),
        )
        .with_batch_budget(budget);
        for (runner, snapshot) in self.runners.iter_mut().zip(snapshots) {
            let Some(snapshot) = snapshot else {
                continue;
            };
            if let Err(e) = runner.maintain(snapshot, &mut ctx, now) {
                warn!("维护运行器 {} 失败: {}", runner.target(), e);
            }
        }
    }

    /// 每个tick至多为一个空闲目标创建运行器，达到全局批次上限时不分配
    async fn admit_target(&mut self, now: i64) -> bool {
        if self.runners.len() >= self.config.max_targets {
            return false;
        }
        let budget = self.batch_budget();
        if budget == 0 {
            if !self.queue.is_empty() {
                debug!(
                    "达到全局批次上限 {}，暂不分配新目标",
                    self.config.max_total_batches
                );
            }
            return false;
        }
        let Some(profile) = self.queue.pop_next() else {
            return false;
        };
        let snapshot = match self.deps.inspector.snapshot(&profile.name).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("获取目标 {} 状态失败，暂不分配: {}", profile.name, e);
                return false;
            }
        };

        let max_concurrent_batches = match self.admission_size(&profile, &snapshot) {
            Ok(size) => size,
            Err(e) => {
                warn!("目标 {} 无法构建模板计划: {}", profile.name, e);
                return false;
            }
        };
        let runner = BatchRunner::new(
            RunnerSpec {
                target: profile.name.clone(),
                max_concurrent_batches,
                intensity: self.intensity,
            },
            self.runner_settings.clone(),
            self.plan_builder.clone(),
            self.metrics.clone(),
        );
        self.runners.push(runner);

        let mut ctx = DispatchContext::new(
            &mut self.pool,
            self.deps.launcher.as_ref(),
            self.subscriber.channel_id(),
        )
        .with_batch_budget(budget);
        if let Some(runner) = self.runners.last_mut() {
            if let Err(e) = runner.step_initialization(&snapshot, &mut ctx, now) {
                warn!("目标 {} 初始化失败: {}", profile.name, e);
            }
        }
        true
    }

    /// 模板计划跨度除以批次间隔，限制在 `[1, max_batches_per_target]`
    fn admission_size(
        &self,
        profile: &TargetProfile,
        snapshot: &TargetSnapshot,
    ) -> SchedulerResult<usize> {
        let template =
            self.plan_builder
                .build(snapshot, self.runner_settings.plan_strategy, self.intensity)?;
        let delay = self.new_batch_delay_ms.max(1);
        let size = usize::try_from(template.duration_ms() / delay).unwrap_or(0);
        let size = size.clamp(1, self.max_batches_per_target.max(1));
        debug!(
            target = %profile.name,
            plan_duration_ms = template.duration_ms(),
            max_concurrent_batches = size,
            "计算准入上限"
        );
        Ok(size)
    }

    /// 在全局上限内为各运行器尝试启动新批次
    fn admit_batches(&mut self, snapshots: &[Option<TargetSnapshot>], now: i64) -> usize {
        let budget = self.batch_budget();
        let mut started = 0;
        let mut ctx = DispatchContext::new(
            &mut self.pool,
            self.deps.launcher.as_ref(),
            self.subscriber.channel_id(),
        )
        .with_batch_budget(budget);

        for (runner, snapshot) in self.runners.iter_mut().zip(snapshots) {
            if ctx.batch_budget == 0 {
                debug!("达到全局批次上限 {}", self.config.max_total_batches);
                break;
            }
            let Some(snapshot) = snapshot else {
                continue;
            };
            match runner.start_new_batch(snapshot, &mut ctx, now) {
                Ok(Some(_)) => started += 1,
                Ok(None) => {}
                Err(e) => warn!("为目标 {} 构建批次失败: {}", runner.target(), e),
            }
        }
        started
    }

    /// 终止所有运行器的批次并归还容量
    pub fn abort_all(&mut self) {
        let now = self.deps.clock.now_ms();
        for runner in &mut self.runners {
            runner.abort(&mut self.pool, now);
        }
        info!("已终止所有批次");
    }

    /// 按固定间隔执行tick，直到收到停止信号
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> SchedulerResult<()> {
        if !self.initialized {
            self.init().await?;
        }
        let mut ticker = interval(Duration::from_millis(self.config.tick_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("调度器开始运行，tick间隔 {}ms", self.config.tick_interval_ms);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = Instant::now();
                    if let Err(e) = self.tick().await {
                        if e.is_fatal() {
                            error!("调度tick出现致命错误: {}", e);
                            self.abort_all();
                            return Err(e);
                        }
                        warn!("调度tick失败: {}", e);
                    }
                    self.metrics.record_tick_duration(started.elapsed().as_secs_f64());
                }
                _ = shutdown_rx.recv() => {
                    info!("收到停止信号，调度器退出");
                    break;
                }
            }
        }

        self.abort_all();
        Ok(())
    }

    /// 以当前时钟生成统计快照
    pub fn report(&self) -> SchedulerStats {
        self.stats(self.deps.clock.now_ms())
    }

    pub fn stats(&self, now: i64) -> SchedulerStats {
        self.stats.snapshot(
            now,
            &self.runners,
            self.pool.total_capacity(),
            self.pool.free_capacity(),
            self.queue.len(),
        )
    }

    /// 全局上限下还能启动的批次数
    fn batch_budget(&self) -> usize {
        self.config
            .max_total_batches
            .saturating_sub(self.active_batch_count())
    }

    pub fn active_batch_count(&self) -> usize {
        self.runners
            .iter()
            .map(|r| r.active_batches().len())
            .sum()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn runners(&self) -> &[BatchRunner] {
        &self.runners
    }

    pub fn runner(&self, target: &str) -> Option<&BatchRunner> {
        self.runners.iter().find(|r| r.target() == target)
    }

    pub fn queue(&self) -> &TargetQueue {
        &self.queue
    }

    pub fn channel_id(&self) -> u32 {
        self.subscriber.channel_id()
    }
}

async fn fetch_snapshots(
    inspector: &dyn TargetInspector,
    targets: &[String],
) -> Vec<Option<TargetSnapshot>> {
    let mut snapshots = Vec::with_capacity(targets.len());
    for target in targets {
        match inspector.snapshot(target).await {
            Ok(snapshot) => snapshots.push(Some(snapshot)),
            Err(e) => {
                warn!("获取目标 {} 状态失败: {}", target, e);
                snapshots.push(None);
            }
        }
    }
    snapshots
}
