use serde::{Deserialize, Serialize};

use super::OperationKind;

/// 启动一个远程操作进程所需的参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaunchRequest {
    pub task_id: String,
    pub batch_id: u64,
    pub target: String,
    pub kind: OperationKind,
    pub worker: String,
    pub threads: u32,
    pub dispatch_delay_ms: i64,
    pub expected_duration_ms: i64,
    pub channel_id: u32,
}
