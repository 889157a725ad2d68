use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("目标未找到: {name}")]
    TargetNotFound { name: String },
    #[error("无效的资源需求: {0}")]
    InvalidRequirement(String),
    #[error("任务派发失败: 任务 {task_id} - {reason}")]
    Spawn { task_id: String, reason: String },
    #[error("容量不足: {0}")]
    CapacityExhausted(String),
    #[error("无效的状态转换: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("消息队列错误: {0}")]
    MessageQueue(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn target_not_found<S: Into<String>>(name: S) -> Self {
        Self::TargetNotFound { name: name.into() }
    }
    pub fn invalid_requirement<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequirement(msg.into())
    }
    pub fn spawn<T: Into<String>, R: Into<String>>(task_id: T, reason: R) -> Self {
        Self::Spawn {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }
    pub fn capacity_exhausted<S: Into<String>>(msg: S) -> Self {
        Self::CapacityExhausted(msg.into())
    }
    pub fn invalid_transition<F: ToString, T: ToString>(from: F, to: T) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Internal(_) | SchedulerError::Configuration(_)
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::CapacityExhausted(_) | SchedulerError::MessageQueue(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SchedulerError::capacity_exhausted("no worker").is_retryable());
        assert!(SchedulerError::MessageQueue("full".to_string()).is_retryable());
        assert!(!SchedulerError::spawn("ab12cd34", "launch failed").is_retryable());
        assert!(SchedulerError::Internal("boom".to_string()).is_fatal());
        assert!(!SchedulerError::target_not_found("n00dles").is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = SchedulerError::target_not_found("n00dles");
        assert_eq!(err.to_string(), "目标未找到: n00dles");

        let err = SchedulerError::invalid_transition("Success", "Running");
        assert_eq!(err.to_string(), "无效的状态转换: Success -> Running");
    }

    #[test]
    fn test_from_serde_json_error() {
        let err: SchedulerError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, SchedulerError::Serialization(_)));
    }
}
