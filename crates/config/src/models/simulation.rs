use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{ConfigError, ConfigResult};

/// 模拟集群中的一台计算节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulatedWorkerConfig {
    pub hostname: String,
    pub max_capacity: f64,
}

/// 模拟集群中的一个目标
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulatedTargetConfig {
    pub name: String,
    pub required_capability: f64,
    pub growth_rate: f64,
    pub max_available: f64,
    pub min_defense: f64,
    /// 在最低防御下一次hack的基准耗时
    pub base_hack_ms: i64,
    /// 启动时可用量占上限的比例
    pub initial_available_fraction: f64,
    /// 启动时防御高出最低值的部分
    pub initial_defense_offset: f64,
}

/// 内置模拟后端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// 操作时长缩放系数
    pub time_scale: f64,
    /// 操作者当前能力值
    pub capability: f64,
    /// 模拟完成时间的随机抖动上限
    pub jitter_ms: i64,
    pub workers: Vec<SimulatedWorkerConfig>,
    pub targets: Vec<SimulatedTargetConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_scale: 0.1,
            capability: 120.0,
            jitter_ms: 5,
            workers: vec![
                SimulatedWorkerConfig {
                    hostname: "home".to_string(),
                    max_capacity: 512.0,
                },
                SimulatedWorkerConfig {
                    hostname: "pserv-0".to_string(),
                    max_capacity: 256.0,
                },
                SimulatedWorkerConfig {
                    hostname: "pserv-1".to_string(),
                    max_capacity: 256.0,
                },
            ],
            targets: vec![
                SimulatedTargetConfig {
                    name: "n00dles".to_string(),
                    required_capability: 1.0,
                    growth_rate: 30.0,
                    max_available: 1_750_000.0,
                    min_defense: 1.0,
                    base_hack_ms: 10_000,
                    initial_available_fraction: 0.6,
                    initial_defense_offset: 1.0,
                },
                SimulatedTargetConfig {
                    name: "foodnstuff".to_string(),
                    required_capability: 1.0,
                    growth_rate: 5.0,
                    max_available: 50_000_000.0,
                    min_defense: 3.0,
                    base_hack_ms: 15_000,
                    initial_available_fraction: 0.4,
                    initial_defense_offset: 4.0,
                },
                SimulatedTargetConfig {
                    name: "joesguns".to_string(),
                    required_capability: 10.0,
                    growth_rate: 20.0,
                    max_available: 62_500_000.0,
                    min_defense: 5.0,
                    base_hack_ms: 20_000,
                    initial_available_fraction: 0.5,
                    initial_defense_offset: 5.0,
                },
                SimulatedTargetConfig {
                    name: "phantasy".to_string(),
                    required_capability: 100.0,
                    growth_rate: 20.0,
                    max_available: 600_000_000.0,
                    min_defense: 7.0,
                    base_hack_ms: 40_000,
                    initial_available_fraction: 0.3,
                    initial_defense_offset: 6.0,
                },
            ],
        }
    }
}

impl ConfigValidator for SimulationConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_positive(self.time_scale, "simulation.time_scale")?;
        ValidationUtils::validate_positive(self.capability, "simulation.capability")?;
        if self.jitter_ms < 0 {
            return Err(ConfigError::Validation(
                "simulation.jitter_ms cannot be negative".to_string(),
            ));
        }

        for worker in &self.workers {
            ValidationUtils::validate_not_empty(&worker.hostname, "simulation.workers.hostname")?;
            ValidationUtils::validate_positive(
                worker.max_capacity,
                "simulation.workers.max_capacity",
            )?;
        }

        for target in &self.targets {
            ValidationUtils::validate_not_empty(&target.name, "simulation.targets.name")?;
            ValidationUtils::validate_positive(
                target.max_available,
                "simulation.targets.max_available",
            )?;
            ValidationUtils::validate_positive(
                target.min_defense,
                "simulation.targets.min_defense",
            )?;
            if target.base_hack_ms <= 0 {
                return Err(ConfigError::Validation(format!(
                    "simulation.targets.base_hack_ms must be greater than 0 for {}",
                    target.name
                )));
            }
            if !(0.0..=1.0).contains(&target.initial_available_fraction) {
                return Err(ConfigError::Validation(format!(
                    "simulation.targets.initial_available_fraction must be within [0, 1] for {}",
                    target.name
                )));
            }
            if target.initial_defense_offset < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "simulation.targets.initial_defense_offset cannot be negative for {}",
                    target.name
                )));
            }
        }

        Ok(())
    }
}
