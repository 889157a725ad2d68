use batcher_core::{
    CompletionMessage, LaunchRequest, OperationKind, ProcessHandle, ProcessLauncher,
    ResourceRequirement, SchedulerError, SchedulerResult, TaskStatus,
};
use tracing::trace;
use uuid::Uuid;

/// 批次中的一个操作实例
#[derive(Debug)]
pub struct Task {
    id: String,
    batch_id: u64,
    target: String,
    kind: OperationKind,
    finish_order: u8,
    start_order: usize,
    delay_ms: i64,
    requirement: ResourceRequirement,
    worker: Option<String>,
    process: Option<Box<dyn ProcessHandle>>,
    was_running: bool,
    start_time: Option<i64>,
    execute_time: Option<i64>,
    end_time: Option<i64>,
    status: TaskStatus,
    observed_state: Option<f64>,
}

impl Task {
    /// 创建新的任务，完成顺序由操作类型决定
    pub fn new<S: Into<String>>(
        target: S,
        kind: OperationKind,
        requirement: ResourceRequirement,
    ) -> Self {
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            id,
            batch_id: 0,
            target: target.into(),
            kind,
            finish_order: kind.finish_order(),
            start_order: usize::from(kind.finish_order()),
            delay_ms: 0,
            requirement,
            worker: None,
            process: None,
            was_running: false,
            start_time: None,
            execute_time: None,
            end_time: None,
            status: TaskStatus::Waiting,
            observed_state: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn batch_id(&self) -> u64 {
        self.batch_id
    }

    pub(crate) fn set_batch_id(&mut self, batch_id: u64) {
        self.batch_id = batch_id;
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn finish_order(&self) -> u8 {
        self.finish_order
    }

    pub fn start_order(&self) -> usize {
        self.start_order
    }

    pub fn delay_ms(&self) -> i64 {
        self.delay_ms
    }

    pub(crate) fn set_schedule(&mut self, delay_ms: i64, start_order: usize) {
        self.delay_ms = delay_ms;
        self.start_order = start_order;
    }

    pub fn duration_ms(&self) -> i64 {
        self.requirement.expected_duration_ms()
    }

    /// 派发延迟加执行时长，即相对批次开始的预计完成时间
    pub fn total_duration_ms(&self) -> i64 {
        self.delay_ms + self.duration_ms()
    }

    pub fn requirement(&self) -> &ResourceRequirement {
        &self.requirement
    }

    pub fn worker(&self) -> Option<&str> {
        self.worker.as_deref()
    }

    pub(crate) fn assign_worker(&mut self, hostname: String) {
        self.worker = Some(hostname);
    }

    pub(crate) fn take_worker(&mut self) -> Option<String> {
        self.worker.take()
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn execute_time(&self) -> Option<i64> {
        self.execute_time
    }

    pub fn end_time(&self) -> Option<i64> {
        self.end_time
    }

    pub fn observed_state(&self) -> Option<f64> {
        self.observed_state
    }

    pub fn pid(&self) -> Option<u64> {
        self.process.as_ref().map(|p| p.pid())
    }

    /// 启动远程进程；已启动时不做任何事
    pub fn execute(
        &mut self,
        launcher: &dyn ProcessLauncher,
        channel_id: u32,
        now: i64,
    ) -> SchedulerResult<()> {
        if self.process.is_some() {
            return Ok(());
        }
        let worker = self
            .worker
            .clone()
            .ok_or_else(|| SchedulerError::spawn(self.id.clone(), "未分配Worker"))?;

        let request = LaunchRequest {
            task_id: self.id.clone(),
            batch_id: self.batch_id,
            target: self.target.clone(),
            kind: self.kind,
            worker,
            threads: self.requirement.thread_count(),
            dispatch_delay_ms: self.delay_ms,
            expected_duration_ms: self.duration_ms(),
            channel_id,
        };
        let handle = launcher.launch(&request)?;
        trace!(task_id = %self.id, pid = handle.pid(), kind = %self.kind, "任务已派发");

        self.process = Some(handle);
        self.was_running = true;
        self.start_time = Some(now);
        Ok(())
    }

    /// 终止仍在运行的进程并标记取消
    pub fn cancel(&mut self, now: i64) {
        if let Some(process) = &self.process {
            if process.is_running() {
                process.kill();
            }
        }
        self.was_running = false;
        if self.end_time.is_none() {
            self.end_time = Some(now);
        }
        if !self.status.is_terminal() {
            self.status = TaskStatus::Cancelled;
        }
    }

    /// 进程一旦被观察到结束，之后始终返回 false
    pub fn is_running(&mut self) -> bool {
        if !self.was_running {
            return false;
        }
        let running = self.process.as_ref().is_some_and(|p| p.is_running());
        if !running {
            self.was_running = false;
        }
        running
    }

    /// 应用完成通道消息；终态任务不再变化，状态不会回退
    pub fn apply_update(&mut self, message: &CompletionMessage) -> bool {
        if self.status.is_terminal() || status_rank(message.status) < status_rank(self.status) {
            return false;
        }
        self.status = message.status;
        if self.start_time.is_none() {
            self.start_time = Some(message.start_time);
        }
        if message.execute_time.is_some() {
            self.execute_time = message.execute_time;
        }
        if message.end_time.is_some() {
            self.end_time = message.end_time;
        }
        if message.execute_observed_state.is_some() {
            self.observed_state = message.execute_observed_state;
        }
        true
    }
}

fn status_rank(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Waiting => 0,
        TaskStatus::Executing => 1,
        TaskStatus::Completed | TaskStatus::Cancelled => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batcher_testing_utils::{CompletionMessageBuilder, MockProcessLauncher};

    fn task() -> Task {
        let requirement = ResourceRequirement::new(2, 3.5, 1000).unwrap();
        let mut task = Task::new("n00dles", OperationKind::Grow, requirement);
        task.set_batch_id(5);
        task
    }

    #[test]
    fn test_new_task_defaults() {
        let task = task();
        assert_eq!(task.id().len(), 8);
        assert_eq!(task.finish_order(), 2);
        assert_eq!(task.status(), TaskStatus::Waiting);
        assert_eq!(task.duration_ms(), 1000);
        assert!(task.worker().is_none());
    }

    #[test]
    fn test_execute_requires_worker() {
        let launcher = MockProcessLauncher::new();
        let mut task = task();
        let err = task.execute(&launcher, 1, 0).unwrap_err();
        assert!(matches!(err, SchedulerError::Spawn { .. }));
        assert_eq!(launcher.attempt_count(), 0);
    }

    #[test]
    fn test_execute_is_idempotent() {
        let launcher = MockProcessLauncher::new();
        let mut task = task();
        task.assign_worker("home".to_string());
        task.set_schedule(300, 1);

        task.execute(&launcher, 1, 100).unwrap();
        task.execute(&launcher, 1, 200).unwrap();

        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(task.start_time(), Some(100));
        let request = &launcher.launches()[0];
        assert_eq!(request.dispatch_delay_ms, 300);
        assert_eq!(request.threads, 2);
        assert_eq!(request.batch_id, 5);
        assert_eq!(request.worker, "home");
    }

    #[test]
    fn test_launch_failure_propagates() {
        let launcher = MockProcessLauncher::new().failing_on(0);
        let mut task = task();
        task.assign_worker("home".to_string());
        assert!(task.execute(&launcher, 1, 0).is_err());
        assert!(task.pid().is_none());
    }

    #[test]
    fn test_is_running_never_resurrects() {
        let launcher = MockProcessLauncher::new();
        let mut task = task();
        assert!(!task.is_running());

        task.assign_worker("home".to_string());
        task.execute(&launcher, 1, 0).unwrap();
        assert!(task.is_running());

        launcher.finish_all();
        assert!(!task.is_running());
        assert!(!task.is_running());
    }

    #[test]
    fn test_cancel_kills_and_stamps_end_time() {
        let launcher = MockProcessLauncher::new();
        let mut task = task();
        task.assign_worker("home".to_string());
        task.execute(&launcher, 1, 0).unwrap();

        task.cancel(750);
        assert_eq!(launcher.killed_count(), 1);
        assert_eq!(task.status(), TaskStatus::Cancelled);
        assert_eq!(task.end_time(), Some(750));
        assert!(!task.is_running());

        task.cancel(900);
        assert_eq!(task.end_time(), Some(750));
    }

    #[test]
    fn test_apply_update_progression() {
        let mut task = task();
        let id = task.id().to_string();

        let executing = CompletionMessageBuilder::new("n00dles", &id, 5)
            .with_status(TaskStatus::Executing)
            .started_at(10)
            .executed_at(300)
            .build();
        assert!(task.apply_update(&executing));
        assert_eq!(task.status(), TaskStatus::Executing);
        assert_eq!(task.start_time(), Some(10));

        let waiting = CompletionMessageBuilder::new("n00dles", &id, 5).build();
        assert!(!task.apply_update(&waiting));
        assert_eq!(task.status(), TaskStatus::Executing);

        let done = CompletionMessageBuilder::new("n00dles", &id, 5)
            .started_at(10)
            .executed_at(300)
            .with_observed_state(1.0)
            .completed(1300)
            .build();
        assert!(task.apply_update(&done));
        assert_eq!(task.end_time(), Some(1300));
        assert_eq!(task.observed_state(), Some(1.0));

        let late_cancel = CompletionMessageBuilder::new("n00dles", &id, 5)
            .cancelled(1400)
            .build();
        assert!(!task.apply_update(&late_cancel));
        assert_eq!(task.status(), TaskStatus::Completed);
    }
}
