//! # 批处理调度核心模型
//!
//! 错误类型、数据模型，以及调度器依赖的外部协作者接口。

pub mod clock;
pub mod errors;
pub mod models;
pub mod traits;

pub use clock::MonotonicClock;
pub use errors::{SchedulerError, SchedulerResult};
pub use models::{
    ActionDurations, BatchStatus, CompletionMessage, LaunchRequest, OperationKind, RemoteAction,
    RequirementSet, ResourceRequirement, TargetProfile, TargetSnapshot, TaskStatus, Worker,
    WorkerSnapshot,
};
pub use traits::{
    Clock, CompletionSink, ProcessHandle, ProcessLauncher, RequirementEstimator, TargetBackend,
    TargetInspector, WorkerInventory,
};
