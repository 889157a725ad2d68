//! Test data builders

use batcher_core::{
    ActionDurations, CompletionMessage, OperationKind, RequirementSet, ResourceRequirement,
    TargetProfile, TargetSnapshot, TaskStatus,
};

/// Builder for creating TargetSnapshot instances in tests
pub struct TargetSnapshotBuilder {
    snapshot: TargetSnapshot,
}

impl TargetSnapshotBuilder {
    pub fn new() -> Self {
        Self {
            snapshot: TargetSnapshot {
                name: "n00dles".to_string(),
                defense_level: 1.0,
                min_defense_level: 1.0,
                available: 1_000_000.0,
                max_available: 1_000_000.0,
                durations: ActionDurations {
                    hack_ms: 1000,
                    grow_ms: 3200,
                    weaken_ms: 4000,
                },
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.snapshot.name = name.to_string();
        self
    }

    pub fn with_defense(mut self, level: f64, min_level: f64) -> Self {
        self.snapshot.defense_level = level;
        self.snapshot.min_defense_level = min_level;
        self
    }

    pub fn with_available(mut self, available: f64, max_available: f64) -> Self {
        self.snapshot.available = available;
        self.snapshot.max_available = max_available;
        self
    }

    pub fn with_durations(mut self, hack_ms: i64, grow_ms: i64, weaken_ms: i64) -> Self {
        self.snapshot.durations = ActionDurations {
            hack_ms,
            grow_ms,
            weaken_ms,
        };
        self
    }

    /// Snapshot away from baseline: defense raised and half the capacity gone
    pub fn off_baseline(mut self) -> Self {
        self.snapshot.defense_level = self.snapshot.min_defense_level + 5.0;
        self.snapshot.available = self.snapshot.max_available / 2.0;
        self
    }

    pub fn build(self) -> TargetSnapshot {
        self.snapshot
    }

    /// Matching profile for target discovery mocks
    pub fn profile(&self, required_capability: f64, growth_rate: f64) -> TargetProfile {
        TargetProfile {
            name: self.snapshot.name.clone(),
            required_capability,
            growth_rate,
            max_available: self.snapshot.max_available,
            min_defense: self.snapshot.min_defense_level,
        }
    }
}

impl Default for TargetSnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating RequirementSet instances in tests
pub struct RequirementSetBuilder {
    set: RequirementSet,
}

impl RequirementSetBuilder {
    pub fn new() -> Self {
        Self {
            set: RequirementSet::new(),
        }
    }

    pub fn with_requirement(
        mut self,
        kind: OperationKind,
        threads: u32,
        capacity_cost: f64,
        duration_ms: i64,
    ) -> Self {
        let requirement = ResourceRequirement::new(threads, capacity_cost, duration_ms)
            .expect("valid test requirement");
        self.set.insert(kind, requirement);
        self
    }

    /// Four kinds in finish order with the given durations and a shared cost
    pub fn with_durations(mut self, durations_ms: [i64; 4], capacity_cost: f64) -> Self {
        for (kind, duration) in OperationKind::ALL.into_iter().zip(durations_ms) {
            self = self.with_requirement(kind, 1, capacity_cost, duration);
        }
        self
    }

    /// Only the baseline-restoring kinds
    pub fn restore_only(mut self, grow_ms: i64, weaken_ms: i64, capacity_cost: f64) -> Self {
        self = self.with_requirement(OperationKind::Grow, 1, capacity_cost, grow_ms);
        self.with_requirement(OperationKind::GrowWeaken, 1, capacity_cost, weaken_ms)
    }

    pub fn build(self) -> RequirementSet {
        self.set
    }
}

impl Default for RequirementSetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating CompletionMessage instances in tests
pub struct CompletionMessageBuilder {
    message: CompletionMessage,
}

impl CompletionMessageBuilder {
    pub fn new(target: &str, id: &str, batch_id: u64) -> Self {
        Self {
            message: CompletionMessage::new(target, id, batch_id, TaskStatus::Waiting, 0),
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.message.status = status;
        self
    }

    pub fn started_at(mut self, start_time: i64) -> Self {
        self.message.start_time = start_time;
        self
    }

    pub fn executed_at(mut self, execute_time: i64) -> Self {
        self.message.execute_time = Some(execute_time);
        self
    }

    pub fn ended_at(mut self, end_time: i64) -> Self {
        self.message.end_time = Some(end_time);
        self
    }

    pub fn with_observed_state(mut self, observed: f64) -> Self {
        self.message.execute_observed_state = Some(observed);
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.message.reason = Some(reason.to_string());
        self
    }

    /// COMPLETED message ending at `end_time`
    pub fn completed(mut self, end_time: i64) -> Self {
        self.message.status = TaskStatus::Completed;
        self.message.end_time = Some(end_time);
        if self.message.execute_time.is_none() {
            self.message.execute_time = Some(end_time);
        }
        self
    }

    /// CANCELLED message ending at `end_time`
    pub fn cancelled(mut self, end_time: i64) -> Self {
        self.message.status = TaskStatus::Cancelled;
        self.message.end_time = Some(end_time);
        self
    }

    pub fn build(self) -> CompletionMessage {
        self.message
    }
}
