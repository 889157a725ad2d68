//! # 批次调度核心
//!
//! 执行计划编译、批次状态机、单目标准入控制与顶层调度器。
//! 所有可变状态只在调度线程中访问，远程操作通过完成通道回报进度。

pub mod batch_job;
pub mod batch_runner;
pub mod execution_plan;
pub mod scheduler;
pub mod stats;
pub mod target_queue;
pub mod task;
pub mod worker_pool;

pub use batch_job::BatchJob;
pub use batch_runner::{BatchRunner, DispatchContext, RunnerCounters, RunnerSettings, RunnerSpec};
pub use execution_plan::{
    ExecutionPlan, ExecutionPlanBuilder, PlanBuilderFn, PlanContext, PlanSettings, PlanStrategy,
};
pub use scheduler::{Scheduler, SchedulerDeps, TickReport};
pub use stats::{RunnerStats, SchedulerStats, StatsTracker, TickDriftStats};
pub use target_queue::{is_easy, is_eligible, TargetQueue};
pub use task::Task;
pub use worker_pool::WorkerPool;
