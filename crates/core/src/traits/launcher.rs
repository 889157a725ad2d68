use std::fmt::Debug;

use crate::errors::SchedulerResult;
use crate::models::LaunchRequest;

/// 已启动的远程操作进程
pub trait ProcessHandle: Send + Sync + Debug {
    fn pid(&self) -> u64;

    fn is_running(&self) -> bool;

    /// 终止进程，对已结束的进程无效果
    fn kill(&self);
}

/// 进程启动接口，调用不阻塞
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, request: &LaunchRequest) -> SchedulerResult<Box<dyn ProcessHandle>>;
}
