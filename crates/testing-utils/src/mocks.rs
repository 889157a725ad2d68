//! Mock implementations of the scheduler's external collaborators
//!
//! All mocks keep their state behind `Arc<Mutex<..>>` so clones share it:
//! hand one clone to the code under test and inspect the other.

use async_trait::async_trait;
use batcher_core::{
    Clock, CompletionMessage, CompletionSink, LaunchRequest, ProcessHandle, ProcessLauncher,
    RequirementEstimator, RequirementSet, SchedulerError, SchedulerResult, TargetInspector,
    TargetProfile, TargetSnapshot, WorkerInventory, WorkerSnapshot,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Handle returned by [`MockProcessLauncher`]
#[derive(Debug, Clone)]
pub struct MockProcessHandle {
    pid: u64,
    running: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
}

impl ProcessHandle for MockProcessHandle {
    fn pid(&self) -> u64 {
        self.pid
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn kill(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.killed.store(true, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Default)]
struct LauncherState {
    launches: Vec<LaunchRequest>,
    handles: Vec<MockProcessHandle>,
    attempts: usize,
    fail_on: HashSet<usize>,
    fail_all: bool,
}

/// Mock implementation of ProcessLauncher that records successful launches
#[derive(Debug, Clone, Default)]
pub struct MockProcessLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl MockProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the launch attempt with the given zero-based index
    pub fn failing_on(self, attempt: usize) -> Self {
        self.state.lock().unwrap().fail_on.insert(attempt);
        self
    }

    pub fn set_fail_all(&self, fail_all: bool) {
        self.state.lock().unwrap().fail_all = fail_all;
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.state.lock().unwrap().launches.clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn launch_count(&self) -> usize {
        self.state.lock().unwrap().handles.len()
    }

    pub fn running_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .handles
            .iter()
            .filter(|h| h.is_running())
            .count()
    }

    pub fn killed_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .handles
            .iter()
            .filter(|h| h.killed.load(Ordering::SeqCst))
            .count()
    }

    /// Let every launched process exit normally
    pub fn finish_all(&self) {
        for handle in &self.state.lock().unwrap().handles {
            handle.running.store(false, Ordering::SeqCst);
        }
    }

    pub fn finish_task(&self, task_id: &str) {
        let state = self.state.lock().unwrap();
        for (request, handle) in state.launches.iter().zip(state.handles.iter()) {
            if request.task_id == task_id {
                handle.running.store(false, Ordering::SeqCst);
            }
        }
    }
}

impl ProcessLauncher for MockProcessLauncher {
    fn launch(&self, request: &LaunchRequest) -> SchedulerResult<Box<dyn ProcessHandle>> {
        let mut state = self.state.lock().unwrap();
        let attempt = state.attempts;
        state.attempts += 1;

        if state.fail_all || state.fail_on.contains(&attempt) {
            return Err(SchedulerError::spawn(
                request.task_id.clone(),
                format!("mock launch failure on attempt {attempt}"),
            ));
        }

        let handle = MockProcessHandle {
            pid: attempt as u64 + 1,
            running: Arc::new(AtomicBool::new(true)),
            killed: Arc::new(AtomicBool::new(false)),
        };
        state.launches.push(request.clone());
        state.handles.push(handle.clone());
        Ok(Box::new(handle))
    }
}

/// Mock implementation of TargetInspector backed by a map of snapshots
#[derive(Debug, Clone)]
pub struct MockTargetInspector {
    profiles: Arc<Mutex<Vec<TargetProfile>>>,
    snapshots: Arc<Mutex<HashMap<String, TargetSnapshot>>>,
    capability: Arc<Mutex<f64>>,
}

impl MockTargetInspector {
    pub fn new() -> Self {
        Self {
            profiles: Arc::new(Mutex::new(Vec::new())),
            snapshots: Arc::new(Mutex::new(HashMap::new())),
            capability: Arc::new(Mutex::new(100.0)),
        }
    }

    pub fn with_target(self, profile: TargetProfile, snapshot: TargetSnapshot) -> Self {
        self.add_target(profile, snapshot);
        self
    }

    /// Make a target discoverable on the next `list_targets` call
    pub fn add_target(&self, profile: TargetProfile, snapshot: TargetSnapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(profile.name.clone(), snapshot);
        self.profiles.lock().unwrap().push(profile);
    }

    pub fn set_snapshot(&self, snapshot: TargetSnapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.name.clone(), snapshot);
    }

    pub fn set_capability(&self, capability: f64) {
        *self.capability.lock().unwrap() = capability;
    }
}

impl Default for MockTargetInspector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TargetInspector for MockTargetInspector {
    async fn list_targets(&self) -> SchedulerResult<Vec<TargetProfile>> {
        Ok(self.profiles.lock().unwrap().clone())
    }

    async fn snapshot(&self, name: &str) -> SchedulerResult<TargetSnapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::target_not_found(name))
    }

    async fn capability(&self) -> SchedulerResult<f64> {
        Ok(*self.capability.lock().unwrap())
    }
}

/// Mock implementation of WorkerInventory
#[derive(Debug, Clone, Default)]
pub struct MockWorkerInventory {
    workers: Arc<Mutex<Vec<WorkerSnapshot>>>,
}

impl MockWorkerInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker(self, hostname: &str, max_capacity: f64) -> Self {
        self.workers.lock().unwrap().push(WorkerSnapshot {
            hostname: hostname.to_string(),
            max_capacity,
        });
        self
    }

    pub fn set_workers(&self, workers: Vec<WorkerSnapshot>) {
        *self.workers.lock().unwrap() = workers;
    }
}

#[async_trait]
impl WorkerInventory for MockWorkerInventory {
    async fn list_workers(&self) -> SchedulerResult<Vec<WorkerSnapshot>> {
        Ok(self.workers.lock().unwrap().clone())
    }
}

/// RequirementEstimator returning preconfigured sets regardless of target state
#[derive(Debug, Clone)]
pub struct FixedRequirementEstimator {
    batch: RequirementSet,
    restore: RequirementSet,
    intensities: Arc<Mutex<Vec<f64>>>,
}

impl FixedRequirementEstimator {
    pub fn new(batch: RequirementSet, restore: RequirementSet) -> Self {
        Self {
            batch,
            restore,
            intensities: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Intensities seen by `batch_requirements`, in call order
    pub fn intensities(&self) -> Vec<f64> {
        self.intensities.lock().unwrap().clone()
    }
}

impl RequirementEstimator for FixedRequirementEstimator {
    fn batch_requirements(
        &self,
        _snapshot: &TargetSnapshot,
        intensity: f64,
    ) -> SchedulerResult<RequirementSet> {
        self.intensities.lock().unwrap().push(intensity);
        Ok(self.batch.clone())
    }

    fn restore_requirements(&self, _snapshot: &TargetSnapshot) -> SchedulerResult<RequirementSet> {
        Ok(self.restore.clone())
    }
}

/// CompletionSink collecting published messages in memory
#[derive(Debug, Clone, Default)]
pub struct MockCompletionSink {
    messages: Arc<Mutex<Vec<CompletionMessage>>>,
    channel_id: u32,
}

impl MockCompletionSink {
    pub fn new(channel_id: u32) -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            channel_id,
        }
    }

    pub fn messages(&self) -> Vec<CompletionMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl CompletionSink for MockCompletionSink {
    fn publish(&self, message: &CompletionMessage) -> SchedulerResult<()> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn channel_id(&self) -> u32 {
        self.channel_id
    }
}

/// Clock advanced explicitly by the test
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) -> i64 {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
