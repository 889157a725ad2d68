use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{ConfigError, ConfigResult};

/// 一个完整批次的任务数
pub const TASKS_PER_BATCH: usize = 4;

/// 正常批次使用的计划策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanStrategyKind {
    #[default]
    Hwgw,
    Fixed,
}

impl std::fmt::Display for PlanStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStrategyKind::Hwgw => write!(f, "hwgw"),
            PlanStrategyKind::Fixed => write!(f, "fixed"),
        }
    }
}

/// 因漂移取消后续批次时对准入节奏的处理
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriftCancelPacing {
    /// 不影响准入节奏
    #[default]
    Transparent,
    /// 从取消时刻重新计算批次间隔
    Delay,
}

impl std::fmt::Display for DriftCancelPacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftCancelPacing::Transparent => write!(f, "transparent"),
            DriftCancelPacing::Delay => write!(f, "delay"),
        }
    }
}

/// 调度循环配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 调度tick间隔
    pub tick_interval_ms: u64,
    /// 统计输出间隔
    pub stats_interval_ms: u64,
    /// 所有目标合计的在途批次上限
    pub max_total_batches: usize,
    /// 同时处理的目标数量上限
    pub max_targets: usize,
    /// 完成通道容量
    pub channel_capacity: usize,
    /// 目标所需能力低于 `capability / divisor` 时视为易攻目标
    pub capability_threshold_divisor: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            stats_interval_ms: 10_000,
            max_total_batches: 200,
            max_targets: 4,
            channel_capacity: 4096,
            capability_threshold_divisor: 3.0,
        }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_interval_ms(self.tick_interval_ms, "scheduler.tick_interval_ms")?;
        ValidationUtils::validate_interval_ms(
            self.stats_interval_ms,
            "scheduler.stats_interval_ms",
        )?;
        ValidationUtils::validate_count(
            self.max_total_batches,
            "scheduler.max_total_batches",
            100_000,
        )?;
        ValidationUtils::validate_count(self.max_targets, "scheduler.max_targets", 1_000)?;
        ValidationUtils::validate_count(
            self.channel_capacity,
            "scheduler.channel_capacity",
            1_000_000,
        )?;
        ValidationUtils::validate_positive(
            self.capability_threshold_divisor,
            "scheduler.capability_threshold_divisor",
        )?;
        Ok(())
    }
}

/// 批次构建与准入配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    /// 同一批次内相邻任务完成时间的间隔
    pub task_spacing_ms: i64,
    /// 同一目标两次启动批次之间的最小间隔
    pub new_batch_delay_ms: i64,
    /// 单个目标并发批次上限
    pub max_batches_per_target: usize,
    /// 每个批次取走的资源比例
    pub intensity: f64,
    pub plan_strategy: PlanStrategyKind,
    /// 批次无在途任务后判定为僵尸之前的等待时间
    pub zombie_grace_ms: i64,
    pub drift_cancel_pacing: DriftCancelPacing,
    /// 检查相邻成功批次的完成先后
    pub verify_batch_sequence: bool,
    /// fixed策略下四个操作的执行时长
    pub fixed_durations_ms: Vec<i64>,
    /// fixed策略下每个任务占用的容量
    pub fixed_capacity_cost: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            task_spacing_ms: 100,
            new_batch_delay_ms: 1000,
            max_batches_per_target: 50,
            intensity: 0.25,
            plan_strategy: PlanStrategyKind::Hwgw,
            zombie_grace_ms: 2000,
            drift_cancel_pacing: DriftCancelPacing::Transparent,
            verify_batch_sequence: true,
            fixed_durations_ms: vec![1000, 6000, 4000, 6000],
            fixed_capacity_cost: 1.75,
        }
    }
}

impl BatchConfig {
    /// 漂移取消的任务是否推迟下一次准入
    pub fn drift_cancel_delays_admission(&self) -> bool {
        self.drift_cancel_pacing == DriftCancelPacing::Delay
    }

    /// 一个批次首尾任务完成时间的跨度
    pub fn finish_window_ms(&self) -> i64 {
        (TASKS_PER_BATCH as i64 - 1) * self.task_spacing_ms
    }
}

impl ConfigValidator for BatchConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.task_spacing_ms <= 0 {
            return Err(ConfigError::Validation(
                "batch.task_spacing_ms must be greater than 0".to_string(),
            ));
        }
        if self.new_batch_delay_ms <= 0 {
            return Err(ConfigError::Validation(
                "batch.new_batch_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.zombie_grace_ms < 0 {
            return Err(ConfigError::Validation(
                "batch.zombie_grace_ms cannot be negative".to_string(),
            ));
        }
        ValidationUtils::validate_count(
            self.max_batches_per_target,
            "batch.max_batches_per_target",
            10_000,
        )?;
        ValidationUtils::validate_fraction(self.intensity, "batch.intensity")?;
        if self.verify_batch_sequence && self.new_batch_delay_ms <= self.finish_window_ms() {
            return Err(ConfigError::Validation(format!(
                "batch.new_batch_delay_ms ({}) must exceed the finish window of one batch ({}ms) \
                 when verify_batch_sequence is enabled",
                self.new_batch_delay_ms,
                self.finish_window_ms()
            )));
        }
        if self.fixed_durations_ms.len() != TASKS_PER_BATCH {
            return Err(ConfigError::Validation(format!(
                "batch.fixed_durations_ms must contain {TASKS_PER_BATCH} durations, got {}",
                self.fixed_durations_ms.len()
            )));
        }
        if self.fixed_durations_ms.iter().any(|d| *d <= 0) {
            return Err(ConfigError::Validation(
                "batch.fixed_durations_ms must all be greater than 0".to_string(),
            ));
        }
        ValidationUtils::validate_positive(self.fixed_capacity_cost, "batch.fixed_capacity_cost")?;
        Ok(())
    }
}

/// 远程操作配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OperationConfig {
    /// 实际等待时间超出派发延迟多少毫秒时自行取消
    pub drift_tolerance_ms: i64,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            drift_tolerance_ms: 50,
        }
    }
}

impl ConfigValidator for OperationConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.drift_tolerance_ms < 0 {
            return Err(ConfigError::Validation(
                "operation.drift_tolerance_ms cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SchedulerConfig::default().validate().is_ok());
        assert!(BatchConfig::default().validate().is_ok());
        assert!(OperationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_batch_config_rejects_unknown_strategy() {
        assert!(toml::from_str::<BatchConfig>("plan_strategy = \"hgw\"").is_err());
        assert!(toml::from_str::<BatchConfig>("drift_cancel_pacing = \"skip\"").is_err());

        let config: BatchConfig = toml::from_str(
            r#"
plan_strategy = "fixed"
drift_cancel_pacing = "delay"
"#,
        )
        .unwrap();
        assert_eq!(config.plan_strategy, PlanStrategyKind::Fixed);
        assert_eq!(config.drift_cancel_pacing, DriftCancelPacing::Delay);
    }

    #[test]
    fn test_batch_delay_must_exceed_finish_window() {
        let overlapping = BatchConfig {
            new_batch_delay_ms: 200,
            task_spacing_ms: 100,
            ..BatchConfig::default()
        };
        assert!(overlapping.validate().is_err());

        let touching = BatchConfig {
            new_batch_delay_ms: 300,
            ..overlapping.clone()
        };
        assert!(touching.validate().is_err());

        let spaced = BatchConfig {
            new_batch_delay_ms: 301,
            ..overlapping.clone()
        };
        assert!(spaced.validate().is_ok());

        let unchecked = BatchConfig {
            verify_batch_sequence: false,
            ..overlapping
        };
        assert!(unchecked.validate().is_ok());
    }

    #[test]
    fn test_batch_config_rejects_wrong_fixed_duration_count() {
        let config = BatchConfig {
            plan_strategy: PlanStrategyKind::Fixed,
            fixed_durations_ms: vec![1000, 2000],
            ..BatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_batch_config_rejects_full_intensity() {
        let config = BatchConfig {
            intensity: 1.0,
            ..BatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_drift_cancel_pacing_policy() {
        let mut config = BatchConfig::default();
        assert!(!config.drift_cancel_delays_admission());
        config.drift_cancel_pacing = DriftCancelPacing::Delay;
        assert!(config.drift_cancel_delays_admission());
    }

    #[test]
    fn test_scheduler_config_rejects_zero_tick() {
        let config = SchedulerConfig {
            tick_interval_ms: 0,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
