use serde::{Deserialize, Serialize};

use super::TaskStatus;
use crate::errors::SchedulerResult;

/// 远程操作在每次生命周期变化时写入完成通道的消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMessage {
    pub target: String,
    pub id: String,
    pub batch_id: u64,
    pub status: TaskStatus,
    pub start_time: i64,
    #[serde(default)]
    pub execute_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub execute_observed_state: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CompletionMessage {
    pub fn new<T: Into<String>, I: Into<String>>(
        target: T,
        id: I,
        batch_id: u64,
        status: TaskStatus,
        start_time: i64,
    ) -> Self {
        Self {
            target: target.into(),
            id: id.into(),
            batch_id,
            status,
            start_time,
            execute_time: None,
            end_time: None,
            execute_observed_state: None,
            reason: None,
        }
    }

    pub fn from_json(json: &str) -> SchedulerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> SchedulerResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
