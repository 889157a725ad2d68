//! 执行计划：为一个目标生成一组任务，并编译派发延迟使其按预期顺序完成

use batcher_config::{BatchConfig, PlanStrategyKind};
use batcher_core::{
    OperationKind, RequirementEstimator, RequirementSet, ResourceRequirement, SchedulerError,
    SchedulerResult, TargetSnapshot,
};
use std::fmt;
use std::sync::Arc;

use crate::task::Task;

/// 计划策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanStrategy {
    /// 完整的四操作批次
    Hwgw,
    /// 只包含恢复基线的操作
    Restore,
    /// 使用配置中的固定时长
    Fixed,
}

/// 计划构建函数：根据目标状态给出各操作的资源需求
pub type PlanBuilderFn = fn(&PlanContext<'_>) -> SchedulerResult<RequirementSet>;

static PLAN_BUILDERS: [(PlanStrategy, PlanBuilderFn); 3] = [
    (PlanStrategy::Hwgw, build_hwgw),
    (PlanStrategy::Restore, build_restore),
    (PlanStrategy::Fixed, build_fixed),
];

impl PlanStrategy {
    pub fn builder(self) -> PlanBuilderFn {
        PLAN_BUILDERS
            .iter()
            .find(|(strategy, _)| *strategy == self)
            .map(|(_, builder)| *builder)
            .unwrap_or(build_hwgw)
    }
}

impl From<PlanStrategyKind> for PlanStrategy {
    fn from(kind: PlanStrategyKind) -> Self {
        match kind {
            PlanStrategyKind::Hwgw => PlanStrategy::Hwgw,
            PlanStrategyKind::Fixed => PlanStrategy::Fixed,
        }
    }
}

impl fmt::Display for PlanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStrategy::Hwgw => write!(f, "hwgw"),
            PlanStrategy::Restore => write!(f, "restore"),
            PlanStrategy::Fixed => write!(f, "fixed"),
        }
    }
}

/// 构建计划所需的输入
pub struct PlanContext<'a> {
    pub snapshot: &'a TargetSnapshot,
    pub estimator: &'a dyn RequirementEstimator,
    pub intensity: f64,
    pub settings: &'a PlanSettings,
}

fn build_hwgw(ctx: &PlanContext<'_>) -> SchedulerResult<RequirementSet> {
    ctx.estimator.batch_requirements(ctx.snapshot, ctx.intensity)
}

fn build_restore(ctx: &PlanContext<'_>) -> SchedulerResult<RequirementSet> {
    let requirements = ctx.estimator.restore_requirements(ctx.snapshot)?;
    let mut restore = RequirementSet::new();
    for (kind, requirement) in requirements.iter() {
        if kind.restores_baseline() {
            restore.insert(kind, *requirement);
        }
    }
    Ok(restore)
}

fn build_fixed(ctx: &PlanContext<'_>) -> SchedulerResult<RequirementSet> {
    let durations = &ctx.settings.fixed_durations_ms;
    if durations.len() != OperationKind::ALL.len() {
        return Err(SchedulerError::invalid_requirement(format!(
            "fixed plan needs {} durations, got {}",
            OperationKind::ALL.len(),
            durations.len()
        )));
    }
    let mut set = RequirementSet::new();
    for (kind, duration) in OperationKind::ALL.into_iter().zip(durations.iter()) {
        set.insert(
            kind,
            ResourceRequirement::new(1, ctx.settings.fixed_capacity_cost, *duration)?,
        );
    }
    Ok(set)
}

/// 计划相关配置
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSettings {
    pub task_spacing_ms: i64,
    pub fixed_durations_ms: Vec<i64>,
    pub fixed_capacity_cost: f64,
}

impl From<&BatchConfig> for PlanSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            task_spacing_ms: config.task_spacing_ms,
            fixed_durations_ms: config.fixed_durations_ms.clone(),
            fixed_capacity_cost: config.fixed_capacity_cost,
        }
    }
}

/// 执行计划
#[derive(Debug)]
pub struct ExecutionPlan {
    target: String,
    strategy: PlanStrategy,
    requirements: RequirementSet,
    tasks: Vec<Task>,
    task_spacing_ms: i64,
    compiled: bool,
}

impl ExecutionPlan {
    pub fn new<S: Into<String>>(target: S, strategy: PlanStrategy, task_spacing_ms: i64) -> Self {
        Self {
            target: target.into(),
            strategy,
            requirements: RequirementSet::new(),
            tasks: Vec::new(),
            task_spacing_ms,
            compiled: false,
        }
    }

    /// 按需求集合为每种操作创建任务并编译
    pub fn from_requirements<S: Into<String>>(
        target: S,
        strategy: PlanStrategy,
        requirements: RequirementSet,
        task_spacing_ms: i64,
    ) -> SchedulerResult<Self> {
        let mut plan = Self::new(target, strategy, task_spacing_ms);
        for (kind, requirement) in requirements.iter() {
            plan.push_task(Task::new(plan.target.clone(), kind, *requirement))?;
        }
        plan.requirements = requirements;
        plan.compile();
        Ok(plan)
    }

    /// 编译前追加任务
    pub fn push_task(&mut self, task: Task) -> SchedulerResult<()> {
        if self.compiled {
            return Err(SchedulerError::invalid_transition("compiled", "push_task"));
        }
        if self
            .tasks
            .iter()
            .any(|t| t.finish_order() == task.finish_order())
        {
            return Err(SchedulerError::invalid_requirement(format!(
                "duplicate finish order {} in plan",
                task.finish_order()
            )));
        }
        self.tasks.push(task);
        Ok(())
    }

    /// 计算每个任务的派发延迟和派发顺序
    ///
    /// 以耗时最长的任务为基准（耗时相同取完成顺序较小者），
    /// `delay = (longest - duration) + finish_order * spacing`，
    /// 无漂移时任务按完成顺序依次完成、间隔恰为 spacing。
    pub fn compile(&mut self) {
        self.compiled = true;

        let Some(longest) = self
            .tasks
            .iter()
            .map(|t| (t.duration_ms(), t.finish_order()))
            .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
            .map(|(duration, _)| duration)
        else {
            return;
        };

        let spacing = self.task_spacing_ms;
        let mut schedule: Vec<(i64, u8, usize)> = self
            .tasks
            .iter()
            .enumerate()
            .map(|(index, t)| {
                let delay = (longest - t.duration_ms()) + i64::from(t.finish_order()) * spacing;
                (delay, t.finish_order(), index)
            })
            .collect();
        schedule.sort();

        for (start_order, (delay, _, index)) in schedule.into_iter().enumerate() {
            self.tasks[index].set_schedule(delay, start_order);
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// 批次总跨度：所有任务中最晚的预计完成时间
    pub fn duration_ms(&self) -> i64 {
        self.tasks
            .iter()
            .map(|t| t.total_duration_ms())
            .max()
            .unwrap_or(0)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn strategy(&self) -> PlanStrategy {
        self.strategy
    }

    pub fn requirements(&self) -> &RequirementSet {
        &self.requirements
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut [Task] {
        &mut self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_spacing_ms(&self) -> i64 {
        self.task_spacing_ms
    }

    pub fn total_capacity_cost(&self) -> f64 {
        self.tasks
            .iter()
            .map(|t| t.requirement().capacity_cost())
            .sum()
    }
}

/// 按策略函数表构建执行计划
#[derive(Clone)]
pub struct ExecutionPlanBuilder {
    settings: PlanSettings,
    estimator: Arc<dyn RequirementEstimator>,
}

impl ExecutionPlanBuilder {
    pub fn new(settings: PlanSettings, estimator: Arc<dyn RequirementEstimator>) -> Self {
        Self {
            settings,
            estimator,
        }
    }

    pub fn settings(&self) -> &PlanSettings {
        &self.settings
    }

    pub fn build(
        &self,
        snapshot: &TargetSnapshot,
        strategy: PlanStrategy,
        intensity: f64,
    ) -> SchedulerResult<ExecutionPlan> {
        let ctx = PlanContext {
            snapshot,
            estimator: self.estimator.as_ref(),
            intensity,
            settings: &self.settings,
        };
        let requirements = (strategy.builder())(&ctx)?;
        if requirements.is_empty() {
            return Err(SchedulerError::invalid_requirement(format!(
                "{strategy} plan for {} has no operations",
                snapshot.name
            )));
        }
        ExecutionPlan::from_requirements(
            snapshot.name.clone(),
            strategy,
            requirements,
            self.settings.task_spacing_ms,
        )
    }
}
