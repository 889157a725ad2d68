use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::OperationKind;
use crate::errors::{SchedulerError, SchedulerResult};

/// 单个操作的资源需求，构造后不可变
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequirement {
    thread_count: u32,
    capacity_cost: f64,
    expected_duration_ms: i64,
}

impl ResourceRequirement {
    /// 创建资源需求，线程数、容量和时长都必须为正
    pub fn new(
        thread_count: u32,
        capacity_cost: f64,
        expected_duration_ms: i64,
    ) -> SchedulerResult<Self> {
        if thread_count == 0 {
            return Err(SchedulerError::invalid_requirement(
                "thread_count must be greater than 0",
            ));
        }
        if !capacity_cost.is_finite() || capacity_cost <= 0.0 {
            return Err(SchedulerError::invalid_requirement(format!(
                "capacity_cost must be a positive number, got {capacity_cost}"
            )));
        }
        if expected_duration_ms <= 0 {
            return Err(SchedulerError::invalid_requirement(format!(
                "expected_duration_ms must be greater than 0, got {expected_duration_ms}"
            )));
        }
        Ok(Self {
            thread_count,
            capacity_cost,
            expected_duration_ms,
        })
    }

    pub fn thread_count(&self) -> u32 {
        self.thread_count
    }

    pub fn capacity_cost(&self) -> f64 {
        self.capacity_cost
    }

    pub fn expected_duration_ms(&self) -> i64 {
        self.expected_duration_ms
    }
}

/// 每种操作对应的资源需求
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequirementSet {
    requirements: BTreeMap<OperationKind, ResourceRequirement>,
}

impl RequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: OperationKind, requirement: ResourceRequirement) -> Self {
        self.insert(kind, requirement);
        self
    }

    pub fn insert(&mut self, kind: OperationKind, requirement: ResourceRequirement) {
        self.requirements.insert(kind, requirement);
    }

    pub fn get(&self, kind: OperationKind) -> Option<&ResourceRequirement> {
        self.requirements.get(&kind)
    }

    /// 按完成顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (OperationKind, &ResourceRequirement)> {
        self.requirements.iter().map(|(kind, req)| (*kind, req))
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn total_capacity_cost(&self) -> f64 {
        self.requirements.values().map(|r| r.capacity_cost()).sum()
    }

    pub fn total_threads(&self) -> u64 {
        self.requirements
            .values()
            .map(|r| u64::from(r.thread_count()))
            .sum()
    }
}
