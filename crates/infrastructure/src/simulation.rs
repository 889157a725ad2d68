//! 内存中的模拟集群
//!
//! 同时实现目标查询、节点发现、资源估算和远程动作接口，
//! 让调度器在没有真实远程环境时也能完整运行。

use async_trait::async_trait;
use batcher_config::SimulationConfig;
use batcher_core::{
    ActionDurations, OperationKind, RemoteAction, RequirementEstimator, RequirementSet,
    ResourceRequirement, SchedulerError, SchedulerResult, TargetBackend, TargetInspector,
    TargetProfile, TargetSnapshot, WorkerInventory, WorkerSnapshot,
};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

/// 每个hack线程取走的可用量比例
pub const HACK_FRACTION_PER_THREAD: f64 = 0.002;
/// 每个线程对防御值的影响
pub const HACK_DEFENSE_INCREASE: f64 = 0.002;
pub const GROW_DEFENSE_INCREASE: f64 = 0.004;
pub const WEAKEN_DEFENSE_DECREASE: f64 = 0.05;
/// 每个线程的容量开销
pub const HACK_THREAD_COST: f64 = 1.7;
pub const GROW_THREAD_COST: f64 = 1.75;
pub const WEAKEN_THREAD_COST: f64 = 1.75;

const GROW_TIME_FACTOR: f64 = 3.2;
const WEAKEN_TIME_FACTOR: f64 = 4.0;
const GROW_RATE_PER_THREAD: f64 = 0.0004;
const MAX_RESTORE_GROW_THREADS: u32 = 100;
const MAX_RESTORE_DEFICIT: f64 = 0.99;
const THREAD_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
struct SimulatedTarget {
    profile: TargetProfile,
    base_hack_ms: i64,
    defense: f64,
    available: f64,
}

impl SimulatedTarget {
    fn durations(&self, time_scale: f64) -> ActionDurations {
        let hack =
            self.base_hack_ms as f64 * (self.defense / self.profile.min_defense) * time_scale;
        ActionDurations {
            hack_ms: (hack.round() as i64).max(1),
            grow_ms: ((hack * GROW_TIME_FACTOR).round() as i64).max(1),
            weaken_ms: ((hack * WEAKEN_TIME_FACTOR).round() as i64).max(1),
        }
    }

    fn snapshot(&self, time_scale: f64) -> TargetSnapshot {
        TargetSnapshot {
            name: self.profile.name.clone(),
            defense_level: self.defense,
            min_defense_level: self.profile.min_defense,
            available: self.available,
            max_available: self.profile.max_available,
            durations: self.durations(time_scale),
        }
    }

    fn grow_multiplier(&self) -> f64 {
        1.0 + self.profile.growth_rate * GROW_RATE_PER_THREAD
    }

    fn apply(&mut self, action: RemoteAction, threads: u32) {
        let threads_f = f64::from(threads);
        match action {
            RemoteAction::Hack => {
                let fraction = (threads_f * HACK_FRACTION_PER_THREAD).min(1.0);
                self.available -= self.available * fraction;
                self.defense += threads_f * HACK_DEFENSE_INCREASE;
            }
            RemoteAction::Grow => {
                let grown = self.available.max(1.0) * self.grow_multiplier().powf(threads_f);
                self.available = grown.min(self.profile.max_available);
                self.defense += threads_f * GROW_DEFENSE_INCREASE;
            }
            RemoteAction::Weaken => {
                self.defense =
                    (self.defense - threads_f * WEAKEN_DEFENSE_DECREASE).max(self.profile.min_defense);
            }
        }
    }
}

/// 模拟集群
#[derive(Debug, Clone)]
pub struct SimulatedCluster {
    targets: Arc<Mutex<HashMap<String, SimulatedTarget>>>,
    workers: Vec<WorkerSnapshot>,
    capability: f64,
    time_scale: f64,
    jitter_ms: i64,
}

impl SimulatedCluster {
    pub fn new(config: &SimulationConfig) -> Self {
        let targets = config
            .targets
            .iter()
            .map(|target| {
                let simulated = SimulatedTarget {
                    profile: TargetProfile {
                        name: target.name.clone(),
                        required_capability: target.required_capability,
                        growth_rate: target.growth_rate,
                        max_available: target.max_available,
                        min_defense: target.min_defense,
                    },
                    base_hack_ms: target.base_hack_ms,
                    defense: target.min_defense + target.initial_defense_offset,
                    available: target.max_available * target.initial_available_fraction,
                };
                (target.name.clone(), simulated)
            })
            .collect();

        let workers = config
            .workers
            .iter()
            .map(|worker| WorkerSnapshot {
                hostname: worker.hostname.clone(),
                max_capacity: worker.max_capacity,
            })
            .collect();

        Self {
            targets: Arc::new(Mutex::new(targets)),
            workers,
            capability: config.capability,
            time_scale: config.time_scale,
            jitter_ms: config.jitter_ms,
        }
    }

    fn with_target<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut SimulatedTarget) -> R,
    ) -> SchedulerResult<R> {
        let mut targets = self
            .targets
            .lock()
            .map_err(|_| SchedulerError::Internal("模拟目标状态锁已损坏".to_string()))?;
        let target = targets
            .get_mut(name)
            .ok_or_else(|| SchedulerError::target_not_found(name))?;
        Ok(f(target))
    }

    fn growth_multiplier(&self, name: &str) -> SchedulerResult<f64> {
        self.with_target(name, |target| target.grow_multiplier())
    }
}

fn threads_for_growth(factor: f64, multiplier: f64) -> u32 {
    if factor <= 1.0 || multiplier <= 1.0 {
        return 1;
    }
    ((factor.ln() / multiplier.ln() - THREAD_EPSILON).ceil() as u32).max(1)
}

fn weaken_threads_for(defense_increase: f64) -> u32 {
    ((defense_increase / WEAKEN_DEFENSE_DECREASE - THREAD_EPSILON).ceil() as u32).max(1)
}

fn requirement(
    threads: u32,
    thread_cost: f64,
    duration_ms: i64,
) -> SchedulerResult<ResourceRequirement> {
    ResourceRequirement::new(threads, f64::from(threads) * thread_cost, duration_ms)
}

#[async_trait]
impl TargetInspector for SimulatedCluster {
    async fn list_targets(&self) -> SchedulerResult<Vec<TargetProfile>> {
        let targets = self
            .targets
            .lock()
            .map_err(|_| SchedulerError::Internal("模拟目标状态锁已损坏".to_string()))?;
        Ok(targets.values().map(|t| t.profile.clone()).collect())
    }

    async fn snapshot(&self, name: &str) -> SchedulerResult<TargetSnapshot> {
        let time_scale = self.time_scale;
        self.with_target(name, |target| target.snapshot(time_scale))
    }

    async fn capability(&self) -> SchedulerResult<f64> {
        Ok(self.capability)
    }
}

#[async_trait]
impl WorkerInventory for SimulatedCluster {
    async fn list_workers(&self) -> SchedulerResult<Vec<WorkerSnapshot>> {
        Ok(self.workers.clone())
    }
}

impl RequirementEstimator for SimulatedCluster {
    fn batch_requirements(
        &self,
        snapshot: &TargetSnapshot,
        intensity: f64,
    ) -> SchedulerResult<RequirementSet> {
        if !(intensity > 0.0 && intensity < 1.0) {
            return Err(SchedulerError::invalid_requirement(format!(
                "intensity must be within (0, 1), got {intensity}"
            )));
        }
        let multiplier = self.growth_multiplier(&snapshot.name)?;

        let hack_threads =
            ((intensity / HACK_FRACTION_PER_THREAD + THREAD_EPSILON).floor() as u32).max(1);
        let taken = (f64::from(hack_threads) * HACK_FRACTION_PER_THREAD).min(0.99);
        let grow_threads = threads_for_growth(1.0 / (1.0 - taken), multiplier);
        let hack_weaken_threads =
            weaken_threads_for(f64::from(hack_threads) * HACK_DEFENSE_INCREASE);
        let grow_weaken_threads =
            weaken_threads_for(f64::from(grow_threads) * GROW_DEFENSE_INCREASE);

        let durations = snapshot.durations;
        Ok(RequirementSet::new()
            .with(
                OperationKind::Hack,
                requirement(hack_threads, HACK_THREAD_COST, durations.hack_ms)?,
            )
            .with(
                OperationKind::HackWeaken,
                requirement(hack_weaken_threads, WEAKEN_THREAD_COST, durations.weaken_ms)?,
            )
            .with(
                OperationKind::Grow,
                requirement(grow_threads, GROW_THREAD_COST, durations.grow_ms)?,
            )
            .with(
                OperationKind::GrowWeaken,
                requirement(grow_weaken_threads, WEAKEN_THREAD_COST, durations.weaken_ms)?,
            ))
    }

    fn restore_requirements(&self, snapshot: &TargetSnapshot) -> SchedulerResult<RequirementSet> {
        let multiplier = self.growth_multiplier(&snapshot.name)?;

        let deficit = snapshot.deficit_fraction().min(MAX_RESTORE_DEFICIT);
        let grow_threads =
            threads_for_growth(1.0 / (1.0 - deficit), multiplier).min(MAX_RESTORE_GROW_THREADS);
        let weaken_threads = weaken_threads_for(
            snapshot.excess_defense() + f64::from(grow_threads) * GROW_DEFENSE_INCREASE,
        );

        let durations = snapshot.durations;
        Ok(RequirementSet::new()
            .with(
                OperationKind::Grow,
                requirement(grow_threads, GROW_THREAD_COST, durations.grow_ms)?,
            )
            .with(
                OperationKind::GrowWeaken,
                requirement(weaken_threads, WEAKEN_THREAD_COST, durations.weaken_ms)?,
            ))
    }
}

#[async_trait]
impl TargetBackend for SimulatedCluster {
    async fn perform(
        &self,
        target: &str,
        action: RemoteAction,
        threads: u32,
        expected_duration_ms: i64,
    ) -> SchedulerResult<f64> {
        let observed = self.with_target(target, |t| t.defense)?;
        let jitter = if self.jitter_ms > 0 {
            rand::rng().random_range(0..=self.jitter_ms)
        } else {
            0
        };
        let duration_ms = (expected_duration_ms + jitter).max(0) as u64;
        trace!(target = target, action = %action, threads, duration_ms, "模拟远程动作开始");

        tokio::time::sleep(Duration::from_millis(duration_ms)).await;

        self.with_target(target, |t| {
            t.apply(action, threads);
            debug!(
                target = target,
                action = %action,
                threads,
                defense = t.defense,
                available = t.available,
                "模拟远程动作完成"
            );
        })?;
        Ok(observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batcher_config::{SimulatedTargetConfig, SimulatedWorkerConfig};

    fn config() -> SimulationConfig {
        SimulationConfig {
            time_scale: 1.0,
            capability: 50.0,
            jitter_ms: 0,
            workers: vec![SimulatedWorkerConfig {
                hostname: "home".to_string(),
                max_capacity: 64.0,
            }],
            targets: vec![SimulatedTargetConfig {
                name: "n00dles".to_string(),
                required_capability: 1.0,
                growth_rate: 25.0,
                max_available: 1000.0,
                min_defense: 1.0,
                base_hack_ms: 1000,
                initial_available_fraction: 0.5,
                initial_defense_offset: 1.0,
            }],
        }
    }

    #[tokio::test]
    async fn test_snapshot_and_durations() {
        let cluster = SimulatedCluster::new(&config());
        let snapshot = cluster.snapshot("n00dles").await.unwrap();
        assert_eq!(snapshot.defense_level, 2.0);
        assert_eq!(snapshot.available, 500.0);
        assert_eq!(snapshot.durations.hack_ms, 2000);
        assert_eq!(snapshot.durations.grow_ms, 6400);
        assert_eq!(snapshot.durations.weaken_ms, 8000);
        assert!(!snapshot.is_at_baseline());
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let cluster = SimulatedCluster::new(&config());
        let err = cluster.snapshot("nowhere").await.unwrap_err();
        assert!(matches!(err, SchedulerError::TargetNotFound { .. }));
    }

    #[tokio::test]
    async fn test_inventory_and_targets() {
        let cluster = SimulatedCluster::new(&config());
        let workers = cluster.list_workers().await.unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].max_capacity, 64.0);
        let targets = cluster.list_targets().await.unwrap();
        assert_eq!(targets[0].name, "n00dles");
        assert_eq!(cluster.capability().await.unwrap(), 50.0);
    }

    #[tokio::test]
    async fn test_batch_requirements_cover_all_kinds() {
        let cluster = SimulatedCluster::new(&config());
        let snapshot = cluster.snapshot("n00dles").await.unwrap();
        let set = cluster.batch_requirements(&snapshot, 0.1).unwrap();

        assert_eq!(set.len(), 4);
        let hack = set.get(OperationKind::Hack).unwrap();
        assert_eq!(hack.thread_count(), 50);
        assert!((hack.capacity_cost() - 85.0).abs() < 1e-9);
        assert_eq!(hack.expected_duration_ms(), 2000);
        assert_eq!(set.get(OperationKind::HackWeaken).unwrap().thread_count(), 2);
        assert_eq!(
            set.get(OperationKind::GrowWeaken).unwrap().expected_duration_ms(),
            8000
        );
        assert!(cluster.batch_requirements(&snapshot, 1.5).is_err());
    }

    #[tokio::test]
    async fn test_restore_requirements_only_restore_kinds() {
        let cluster = SimulatedCluster::new(&config());
        let snapshot = cluster.snapshot("n00dles").await.unwrap();
        let set = cluster.restore_requirements(&snapshot).unwrap();

        let kinds: Vec<OperationKind> = set.iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec![OperationKind::Grow, OperationKind::GrowWeaken]);
        assert!(set.get(OperationKind::Grow).unwrap().thread_count() <= MAX_RESTORE_GROW_THREADS);
        assert!(set.get(OperationKind::GrowWeaken).unwrap().thread_count() >= 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_perform_applies_effects_after_duration() {
        let cluster = SimulatedCluster::new(&config());

        let observed = cluster
            .perform("n00dles", RemoteAction::Weaken, 40, 100)
            .await
            .unwrap();
        assert_eq!(observed, 2.0);
        let snapshot = cluster.snapshot("n00dles").await.unwrap();
        assert_eq!(snapshot.defense_level, 1.0);

        cluster
            .perform("n00dles", RemoteAction::Hack, 100, 100)
            .await
            .unwrap();
        let snapshot = cluster.snapshot("n00dles").await.unwrap();
        assert!((snapshot.available - 400.0).abs() < 1e-9);
        assert!((snapshot.defense_level - 1.2).abs() < 1e-9);

        cluster
            .perform("n00dles", RemoteAction::Grow, 1000, 100)
            .await
            .unwrap();
        let snapshot = cluster.snapshot("n00dles").await.unwrap();
        assert_eq!(snapshot.available, 1000.0);
    }
}
