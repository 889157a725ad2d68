use crate::errors::SchedulerResult;
use crate::models::{RequirementSet, TargetSnapshot};

/// 根据目标状态计算各操作的资源需求
pub trait RequirementEstimator: Send + Sync {
    /// 完整批次的需求，`intensity` 为单批次取走的可用量比例
    fn batch_requirements(
        &self,
        snapshot: &TargetSnapshot,
        intensity: f64,
    ) -> SchedulerResult<RequirementSet>;

    /// 只包含把目标恢复到基线所需的操作
    fn restore_requirements(&self, snapshot: &TargetSnapshot) -> SchedulerResult<RequirementSet>;
}
