use async_trait::async_trait;

use crate::errors::SchedulerResult;
use crate::models::{RemoteAction, TargetProfile, TargetSnapshot, WorkerSnapshot};

/// 目标状态查询接口
#[async_trait]
pub trait TargetInspector: Send + Sync {
    /// 列出所有已发现的目标
    async fn list_targets(&self) -> SchedulerResult<Vec<TargetProfile>>;

    /// 获取目标当前状态，未知目标返回 `TargetNotFound`
    async fn snapshot(&self, name: &str) -> SchedulerResult<TargetSnapshot>;

    /// 操作者当前能力值
    async fn capability(&self) -> SchedulerResult<f64>;
}

/// 计算节点发现接口
#[async_trait]
pub trait WorkerInventory: Send + Sync {
    async fn list_workers(&self) -> SchedulerResult<Vec<WorkerSnapshot>>;
}

/// 对目标执行远程动作
#[async_trait]
pub trait TargetBackend: Send + Sync {
    /// 执行动作并返回开始执行时观测到的防御值
    async fn perform(
        &self,
        target: &str,
        action: RemoteAction,
        threads: u32,
        expected_duration_ms: i64,
    ) -> SchedulerResult<f64>;
}
