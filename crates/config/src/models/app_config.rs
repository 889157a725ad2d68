use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    observability::ObservabilityConfig,
    scheduler::{BatchConfig, OperationConfig, SchedulerConfig},
    simulation::SimulationConfig,
};
use crate::validation::ConfigValidator;
use crate::{ConfigError, ConfigResult};

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/batcher.toml",
    "batcher.toml",
    "/etc/batcher/config.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub batch: BatchConfig,
    pub operation: OperationConfig,
    pub observability: ObservabilityConfig,
    pub simulation: SimulationConfig,
}

impl AppConfig {
    /// 加载配置：内置默认值 < 配置文件 < `BATCHER_` 环境变量
    pub fn load(config_path: Option<&str>) -> ConfigResult<Self> {
        let defaults = Self::default().to_toml()?;
        let mut builder =
            ConfigBuilder::builder().add_source(File::from_str(&defaults, FileFormat::Toml));

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(ConfigError::File(format!("配置文件不存在: {path}")));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("BATCHER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: AppConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.scheduler.validate()?;
        self.batch.validate()?;
        self.operation.validate()?;
        self.observability.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogLevel, OutputFormat, PlanStrategyKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.scheduler.tick_interval_ms, 100);
        assert_eq!(config.batch.task_spacing_ms, 100);
        assert_eq!(config.batch.fixed_durations_ms, vec![1000, 6000, 4000, 6000]);
        assert_eq!(config.operation.drift_tolerance_ms, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_from_partial_toml() {
        let toml_str = r#"
[scheduler]
tick_interval_ms = 250
max_targets = 2

[batch]
plan_strategy = "fixed"
new_batch_delay_ms = 500

[observability]
log_level = "debug"
log_format = "json"
"#;

        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.scheduler.tick_interval_ms, 250);
        assert_eq!(config.scheduler.max_targets, 2);
        assert_eq!(config.scheduler.stats_interval_ms, 10_000);
        assert_eq!(config.batch.plan_strategy, PlanStrategyKind::Fixed);
        assert_eq!(config.batch.new_batch_delay_ms, 500);
        assert_eq!(config.batch.task_spacing_ms, 100);
        assert_eq!(config.observability.log_level, LogLevel::Debug);
        assert_eq!(config.observability.log_format, OutputFormat::Json);
    }

    #[test]
    fn test_app_config_from_toml_rejects_invalid_values() {
        let toml_str = r#"
[batch]
intensity = 0.0
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_app_config_toml_round_trip() {
        let config = AppConfig::default();
        let serialized = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&serialized).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[batch]
task_spacing_ms = 200
max_batches_per_target = 8

[operation]
drift_tolerance_ms = 75
"#
        )
        .unwrap();

        let path = temp_file.path().to_str().unwrap();
        let config = AppConfig::load(Some(path)).unwrap();
        assert_eq!(config.batch.task_spacing_ms, 200);
        assert_eq!(config.batch.max_batches_per_target, 8);
        assert_eq!(config.operation.drift_tolerance_ms, 75);
        assert_eq!(config.scheduler.channel_capacity, 4096);
        assert_eq!(config.simulation.workers.len(), 3);
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let result = AppConfig::load(Some("/nonexistent/batcher.toml"));
        assert!(matches!(result, Err(ConfigError::File(_))));
    }
}
