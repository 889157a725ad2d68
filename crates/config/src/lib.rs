//! # 批处理调度器配置
//!
//! 所有可调参数集中在 [`AppConfig`] 中，启动时构造一次，
//! 随后以引用或克隆的方式传给调度器、批次运行器和执行计划构建器。

pub mod models;
pub mod validation;

pub use models::{
    AppConfig, BatchConfig, DriftCancelPacing, LogLevel, ObservabilityConfig, OperationConfig,
    OutputFormat, PlanStrategyKind, SchedulerConfig, SimulatedTargetConfig,
    SimulatedWorkerConfig, SimulationConfig, TASKS_PER_BATCH,
};
pub use validation::{ConfigValidator, ValidationUtils};

/// Configuration error type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration error enumeration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File error: {0}")]
    File(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::File(err.to_string())
    }
}
