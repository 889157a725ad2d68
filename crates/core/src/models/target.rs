use serde::{Deserialize, Serialize};

use super::RemoteAction;

/// 目标的静态属性，用于目标排序
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetProfile {
    pub name: String,
    pub required_capability: f64,
    pub growth_rate: f64,
    pub max_available: f64,
    pub min_defense: f64,
}

/// 各远程动作在目标当前状态下的预计耗时
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionDurations {
    pub hack_ms: i64,
    pub grow_ms: i64,
    pub weaken_ms: i64,
}

impl ActionDurations {
    pub fn of(&self, action: RemoteAction) -> i64 {
        match action {
            RemoteAction::Hack => self.hack_ms,
            RemoteAction::Grow => self.grow_ms,
            RemoteAction::Weaken => self.weaken_ms,
        }
    }
}

/// 某一时刻观测到的目标状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetSnapshot {
    pub name: String,
    pub defense_level: f64,
    pub min_defense_level: f64,
    pub available: f64,
    pub max_available: f64,
    pub durations: ActionDurations,
}

impl TargetSnapshot {
    /// 防御处于最低值且可用量已满
    pub fn is_at_baseline(&self) -> bool {
        self.defense_level <= self.min_defense_level && self.available >= self.max_available
    }

    /// 可用量距上限的缺口占上限的比例
    pub fn deficit_fraction(&self) -> f64 {
        if self.max_available <= 0.0 {
            return 0.0;
        }
        ((self.max_available - self.available) / self.max_available).clamp(0.0, 1.0)
    }

    pub fn excess_defense(&self) -> f64 {
        (self.defense_level - self.min_defense_level).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(defense: f64, available: f64) -> TargetSnapshot {
        TargetSnapshot {
            name: "joesguns".to_string(),
            defense_level: defense,
            min_defense_level: 5.0,
            available,
            max_available: 1000.0,
            durations: ActionDurations {
                hack_ms: 1000,
                grow_ms: 3200,
                weaken_ms: 4000,
            },
        }
    }

    #[test]
    fn test_baseline_requires_both_conditions() {
        assert!(snapshot(5.0, 1000.0).is_at_baseline());
        assert!(!snapshot(5.5, 1000.0).is_at_baseline());
        assert!(!snapshot(5.0, 999.0).is_at_baseline());
    }

    #[test]
    fn test_deficit_fraction() {
        assert_eq!(snapshot(5.0, 1000.0).deficit_fraction(), 0.0);
        assert_eq!(snapshot(5.0, 250.0).deficit_fraction(), 0.75);
        assert_eq!(snapshot(5.0, 0.0).deficit_fraction(), 1.0);
    }

    #[test]
    fn test_durations_by_action() {
        let s = snapshot(5.0, 1000.0);
        assert_eq!(s.durations.of(RemoteAction::Grow), 3200);
        assert_eq!(s.durations.of(RemoteAction::Weaken), 4000);
        assert_eq!(s.excess_defense(), 0.0);
    }
}
