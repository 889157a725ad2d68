//! # 批处理调度基础设施
//!
//! 有界完成通道、指标采集，以及无需真实远程环境即可运行的模拟集群。

pub mod completion_queue;
pub mod metrics_collector;
pub mod simulation;

pub use completion_queue::{
    completion_channel, CompletionPublisher, CompletionSubscriber, QueueStats,
};
pub use metrics_collector::SchedulerMetrics;
pub use simulation::SimulatedCluster;
