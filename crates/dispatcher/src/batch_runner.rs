use std::sync::Arc;

use batcher_config::BatchConfig;
use batcher_core::{
    BatchStatus, CompletionMessage, ProcessLauncher, SchedulerResult, TargetSnapshot,
};
use batcher_infrastructure::SchedulerMetrics;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::batch_job::BatchJob;
use crate::execution_plan::{ExecutionPlan, ExecutionPlanBuilder, PlanStrategy};
use crate::worker_pool::WorkerPool;

/// 运行器启动参数：目标、并发批次上限、强度
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSpec {
    pub target: String,
    pub max_concurrent_batches: usize,
    pub intensity: f64,
}

/// 所有运行器共享的批次节奏参数
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSettings {
    pub new_batch_delay_ms: i64,
    pub zombie_grace_ms: i64,
    pub plan_strategy: PlanStrategy,
    pub drift_cancel_delays_admission: bool,
    pub verify_batch_sequence: bool,
}

impl RunnerSettings {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            new_batch_delay_ms: config.new_batch_delay_ms,
            zombie_grace_ms: config.zombie_grace_ms,
            plan_strategy: config.plan_strategy.into(),
            drift_cancel_delays_admission: config.drift_cancel_delays_admission(),
            verify_batch_sequence: config.verify_batch_sequence,
        }
    }
}

/// 派发批次所需的调度器资源
pub struct DispatchContext<'a> {
    pub pool: &'a mut WorkerPool,
    pub launcher: &'a dyn ProcessLauncher,
    pub channel_id: u32,
    /// 全局上限下本次还能启动的批次数，恢复批次同样占用
    pub batch_budget: usize,
}

impl<'a> DispatchContext<'a> {
    pub fn new(
        pool: &'a mut WorkerPool,
        launcher: &'a dyn ProcessLauncher,
        channel_id: u32,
    ) -> Self {
        Self {
            pool,
            launcher,
            channel_id,
            batch_budget: usize::MAX,
        }
    }

    pub fn with_batch_budget(mut self, batch_budget: usize) -> Self {
        self.batch_budget = batch_budget;
        self
    }
}

/// 运行器累计计数；每个移出活动列表的批次恰好计入一项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunnerCounters {
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub restores: u64,
    pub resets: u64,
    pub dispatch_failures: u64,
}

/// 单个目标的批次准入与恢复控制
pub struct BatchRunner {
    spec: RunnerSpec,
    settings: RunnerSettings,
    plan_builder: ExecutionPlanBuilder,
    metrics: Arc<SchedulerMetrics>,
    active: Vec<BatchJob>,
    initializing: bool,
    needs_reset: bool,
    last_batch_at: Option<i64>,
    last_success_end: Option<i64>,
    next_batch_id: u64,
    counters: RunnerCounters,
}

impl BatchRunner {
    /// 新建的运行器处于初始化阶段
    pub fn new(
        spec: RunnerSpec,
        settings: RunnerSettings,
        plan_builder: ExecutionPlanBuilder,
        metrics: Arc<SchedulerMetrics>,
    ) -> Self {
        info!(
            target = %spec.target,
            max_concurrent_batches = spec.max_concurrent_batches,
            intensity = spec.intensity,
            "创建批次运行器"
        );
        Self {
            spec,
            settings,
            plan_builder,
            metrics,
            active: Vec::new(),
            initializing: true,
            needs_reset: false,
            last_batch_at: None,
            last_success_end: None,
            next_batch_id: 1,
            counters: RunnerCounters::default(),
        }
    }

    pub fn target(&self) -> &str {
        &self.spec.target
    }

    pub fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    pub fn counters(&self) -> RunnerCounters {
        self.counters
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing
    }

    pub fn needs_reset(&self) -> bool {
        self.needs_reset
    }

    pub fn active_batches(&self) -> &[BatchJob] {
        &self.active
    }

    /// 处于运行中的批次数
    pub fn running_count(&self) -> usize {
        self.active
            .iter()
            .filter(|job| job.status() == BatchStatus::Running)
            .count()
    }

    /// 初始化结束、无待重置、未达并发上限且距上一批次已满间隔
    pub fn can_start_new_batch(&self, now: i64) -> bool {
        if self.initializing || self.needs_reset {
            return false;
        }
        if self.running_count() >= self.spec.max_concurrent_batches {
            return false;
        }
        match self.last_batch_at {
            Some(last) => now - last >= self.settings.new_batch_delay_ms,
            None => true,
        }
    }

    /// 尝试启动一个正常批次
    ///
    /// 被节奏或上限拒绝、容量不足、派发失败时返回 `Ok(None)`，下一个tick自然重试。
    pub fn start_new_batch(
        &mut self,
        snapshot: &TargetSnapshot,
        ctx: &mut DispatchContext<'_>,
        now: i64,
    ) -> SchedulerResult<Option<u64>> {
        if !self.can_start_new_batch(now) {
            return Ok(None);
        }
        let plan =
            self.plan_builder
                .build(snapshot, self.settings.plan_strategy, self.spec.intensity)?;
        Ok(self.launch(plan, ctx, now))
    }

    fn launch(
        &mut self,
        plan: ExecutionPlan,
        ctx: &mut DispatchContext<'_>,
        now: i64,
    ) -> Option<u64> {
        if ctx.batch_budget == 0 {
            debug!(target = %self.spec.target, "已达全局批次上限，推迟批次");
            return None;
        }
        let id = self.next_batch_id;
        self.next_batch_id += 1;
        let mut job = BatchJob::new(id, plan);

        if let Err(e) = ctx.pool.reserve(job.tasks_mut()) {
            debug!(target = %self.spec.target, batch_id = id, "推迟批次: {}", e);
            return None;
        }

        if let Err(e) = job.run(ctx.launcher, ctx.channel_id, now) {
            ctx.pool.release(job.tasks_mut());
            self.counters.dispatch_failures += 1;
            warn!(target = %self.spec.target, batch_id = id, "批次派发失败: {}", e);
            return None;
        }

        self.metrics.record_batch_started(&self.spec.target);
        self.last_batch_at = Some(now);
        self.active.push(job);
        ctx.batch_budget -= 1;
        Some(id)
    }

    /// 把完成消息路由到对应批次，返回是否找到归属
    pub fn update_batch_status(&mut self, message: &CompletionMessage, now: i64) -> bool {
        let Some(index) = self
            .active
            .iter()
            .position(|job| job.id() == message.batch_id)
        else {
            return false;
        };
        if !self.active[index].apply_update(message) {
            return false;
        }
        if let Some(status) = self.active[index].refresh_status(now) {
            self.on_batch_finished(index, status);
        }
        true
    }

    fn on_batch_finished(&mut self, index: usize, status: BatchStatus) {
        let job = &mut self.active[index];
        if job.is_restore() {
            debug!(target = %self.spec.target, batch_id = job.id(), status = %status, "恢复批次结束");
            return;
        }

        match status {
            BatchStatus::Success => {
                let first_end = job.first_end_time();
                let out_of_sequence = self.settings.verify_batch_sequence
                    && matches!(
                        (first_end, self.last_success_end),
                        (Some(first), Some(previous)) if first <= previous
                    );
                if out_of_sequence && job.fail_out_of_sequence().is_ok() {
                    error!(target = %self.spec.target, batch_id = job.id(), "批次之间乱序");
                    job.log_violation("批次之间乱序，与上一成功批次交错");
                    self.needs_reset = true;
                    return;
                }
                self.last_success_end = self.last_success_end.max(job.last_end_time());
                debug!(
                    target = %self.spec.target,
                    batch_id = job.id(),
                    drift_ms = job.drift_ms(),
                    "批次成功"
                );
            }
            BatchStatus::Failed => {
                error!(target = %self.spec.target, batch_id = job.id(), "批次完成顺序错误");
                job.log_violation("任务完成顺序与计划不一致");
                self.needs_reset = true;
            }
            BatchStatus::Cancelled => {
                debug!(target = %self.spec.target, batch_id = job.id(), "批次已取消");
            }
            BatchStatus::NotStarted | BatchStatus::Running => {}
        }
    }

    /// 第一个落后于计划的批次导致其后一个运行中批次被取消
    pub fn check_batch_estimated_times(&mut self, now: i64) -> Option<u64> {
        let late = (0..self.active.len()).find(|&i| {
            let job = &mut self.active[i];
            job.status() == BatchStatus::Running && !job.is_on_schedule(now) && job.flag_late()
        })?;

        let follower = self.active[late + 1..]
            .iter_mut()
            .find(|job| job.status() == BatchStatus::Running)?;
        follower.cancel(now);
        let cancelled = follower.id();

        warn!(
            target = %self.spec.target,
            late_batch = self.active[late].id(),
            cancelled_batch = cancelled,
            "批次落后于计划，取消后续批次"
        );
        if self.settings.drift_cancel_delays_admission {
            self.last_batch_at = Some(now);
        }
        Some(cancelled)
    }

    /// 存在僵尸批次时标记需要重置
    pub fn check_zombies(&mut self, now: i64) -> bool {
        let grace = self.settings.zombie_grace_ms;
        let zombie = self
            .active
            .iter_mut()
            .position(|job| job.is_zombie(now, grace))
            .map(|index| self.active[index].id());

        match zombie {
            Some(batch_id) => {
                warn!(target = %self.spec.target, batch_id = batch_id, "检测到僵尸批次");
                self.needs_reset = true;
                true
            }
            None => false,
        }
    }

    /// 移除终态批次并归还容量，返回移除的批次
    pub fn reap_finished_batches(&mut self, pool: &mut WorkerPool) -> Vec<(u64, BatchStatus)> {
        let mut reaped = Vec::new();
        let mut index = 0;
        while index < self.active.len() {
            if !self.active[index].status().is_terminal() {
                index += 1;
                continue;
            }
            let mut job = self.active.remove(index);
            pool.release(job.tasks_mut());
            self.count_removed(&job);
            reaped.push((job.id(), job.status()));
        }
        reaped
    }

    fn count_removed(&mut self, job: &BatchJob) {
        if job.is_restore() {
            self.counters.restores += 1;
            return;
        }
        match job.status() {
            BatchStatus::Success => self.counters.succeeded += 1,
            BatchStatus::Failed => self.counters.failed += 1,
            _ => self.counters.cancelled += 1,
        }
        self.metrics
            .record_batch_finished(&self.spec.target, job.status());
    }

    /// 取消所有批次、归还容量并重新进入初始化阶段
    pub fn reset(&mut self, pool: &mut WorkerPool, now: i64) {
        self.reap_finished_batches(pool);
        let cancelled = self.active.len();
        for mut job in std::mem::take(&mut self.active) {
            job.cancel(now);
            pool.release(job.tasks_mut());
            self.count_removed(&job);
        }

        self.counters.resets += 1;
        self.needs_reset = false;
        self.initializing = true;
        self.last_success_end = None;
        self.metrics.record_runner_reset(&self.spec.target);
        warn!(
            target = %self.spec.target,
            cancelled = cancelled,
            resets = self.counters.resets,
            "批次运行器已重置"
        );
    }

    /// 初始化阶段：目标回到基线后退出，否则保持一个恢复批次在途
    pub fn step_initialization(
        &mut self,
        snapshot: &TargetSnapshot,
        ctx: &mut DispatchContext<'_>,
        now: i64,
    ) -> SchedulerResult<()> {
        if !self.initializing || !self.active.is_empty() {
            return Ok(());
        }
        if snapshot.is_at_baseline() {
            self.initializing = false;
            info!(target = %self.spec.target, "目标已处于基线状态，开始正常批次");
            return Ok(());
        }

        let plan = self
            .plan_builder
            .build(snapshot, PlanStrategy::Restore, self.spec.intensity)?;
        if let Some(batch_id) = self.launch(plan, ctx, now) {
            debug!(
                target = %self.spec.target,
                batch_id = batch_id,
                defense = snapshot.defense_level,
                available = snapshot.available,
                "派发恢复批次"
            );
        }
        Ok(())
    }

    /// 每个tick的维护：进度检查、回收、必要时重置、初始化推进
    pub fn maintain(
        &mut self,
        snapshot: &TargetSnapshot,
        ctx: &mut DispatchContext<'_>,
        now: i64,
    ) -> SchedulerResult<()> {
        for index in 0..self.active.len() {
            if let Some(status) = self.active[index].refresh_status(now) {
                self.on_batch_finished(index, status);
            }
        }
        self.check_batch_estimated_times(now);
        self.check_zombies(now);
        self.reap_finished_batches(ctx.pool);

        if self.needs_reset {
            self.reset(ctx.pool, now);
        }
        self.step_initialization(snapshot, ctx, now)
    }

    /// 终止所有批次，用于调度器停止
    pub fn abort(&mut self, pool: &mut WorkerPool, now: i64) {
        for mut job in std::mem::take(&mut self.active) {
            job.cancel(now);
            pool.release(job.tasks_mut());
            self.count_removed(&job);
        }
    }
}
