use batcher_core::{
    BatchStatus, CompletionMessage, ProcessLauncher, SchedulerError, SchedulerResult, TaskStatus,
};
use std::fmt::Write as _;
use tracing::{debug, warn};

use crate::execution_plan::{ExecutionPlan, PlanStrategy};
use crate::task::Task;

/// 执行计划的一次实例化
#[derive(Debug)]
pub struct BatchJob {
    id: u64,
    plan: ExecutionPlan,
    status: BatchStatus,
    start_time: Option<i64>,
    expected_end_time: Option<i64>,
    end_time: Option<i64>,
    drift_ms: i64,
    quiet_since: Option<i64>,
    late_flagged: bool,
}

impl BatchJob {
    pub fn new(id: u64, mut plan: ExecutionPlan) -> Self {
        for task in plan.tasks_mut() {
            task.set_batch_id(id);
        }
        Self {
            id,
            plan,
            status: BatchStatus::NotStarted,
            start_time: None,
            expected_end_time: None,
            end_time: None,
            drift_ms: 0,
            quiet_since: None,
            late_flagged: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> &str {
        self.plan.target()
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn tasks(&self) -> &[Task] {
        self.plan.tasks()
    }

    pub fn tasks_mut(&mut self) -> &mut [Task] {
        self.plan.tasks_mut()
    }

    pub fn is_restore(&self) -> bool {
        self.plan.strategy() == PlanStrategy::Restore
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn expected_end_time(&self) -> Option<i64> {
        self.expected_end_time
    }

    pub fn end_time(&self) -> Option<i64> {
        self.end_time
    }

    /// 实际结束时间与预计结束时间之差
    pub fn drift_ms(&self) -> i64 {
        self.drift_ms
    }

    /// 按派发顺序启动所有任务；任一任务启动失败则整个批次失败
    pub fn run(
        &mut self,
        launcher: &dyn ProcessLauncher,
        channel_id: u32,
        now: i64,
    ) -> SchedulerResult<()> {
        if self.status != BatchStatus::NotStarted {
            return Err(SchedulerError::invalid_transition(
                self.status,
                BatchStatus::Running,
            ));
        }

        let mut dispatch: Vec<usize> = (0..self.plan.len()).collect();
        dispatch.sort_by_key(|&i| self.plan.tasks()[i].start_order());

        for index in dispatch {
            let result = self.plan.tasks_mut()[index].execute(launcher, channel_id, now);
            if let Err(e) = result {
                for task in self.plan.tasks_mut() {
                    task.cancel(now);
                }
                self.status = BatchStatus::Failed;
                self.end_time = Some(now);
                return Err(e);
            }
        }

        self.status = BatchStatus::Running;
        self.start_time = Some(now);
        self.expected_end_time = Some(now + self.plan.duration_ms());
        debug!(
            target = %self.target(),
            batch_id = self.id,
            tasks = self.plan.len(),
            expected_end = now + self.plan.duration_ms(),
            "批次已启动"
        );
        Ok(())
    }

    /// 取消未结束的批次，返回是否发生了状态变化
    pub fn cancel(&mut self, now: i64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        for task in self.plan.tasks_mut() {
            task.cancel(now);
        }
        self.status = BatchStatus::Cancelled;
        self.end_time = Some(now);
        true
    }

    /// 把完成消息交给对应任务，返回消息是否属于本批次
    pub fn apply_update(&mut self, message: &CompletionMessage) -> bool {
        match self
            .plan
            .tasks_mut()
            .iter_mut()
            .find(|t| t.id() == message.id)
        {
            Some(task) => {
                task.apply_update(message);
                true
            }
            None => false,
        }
    }

    /// 所有任务进入终态后计算批次结果，返回新的终态
    pub fn refresh_status(&mut self, now: i64) -> Option<BatchStatus> {
        if self.status != BatchStatus::Running {
            return None;
        }
        if !self.tasks().iter().all(|t| t.status().is_terminal()) {
            return None;
        }

        let status = if self
            .tasks()
            .iter()
            .any(|t| t.status() == TaskStatus::Cancelled)
        {
            BatchStatus::Cancelled
        } else if self.finished_in_order() {
            BatchStatus::Success
        } else {
            BatchStatus::Failed
        };

        let end = self.last_end_time().unwrap_or(now);
        self.end_time = Some(end);
        if let Some(expected) = self.expected_end_time {
            self.drift_ms = end - expected;
        }
        self.status = status;
        Some(status)
    }

    /// 按完成顺序排列与按实际结束时间排列是否一致
    pub fn finished_in_order(&self) -> bool {
        let mut by_finish: Vec<&Task> = self.tasks().iter().collect();
        by_finish.sort_by_key(|t| t.finish_order());
        let mut by_end: Vec<&Task> = self.tasks().iter().collect();
        by_end.sort_by_key(|t| (t.end_time().unwrap_or(i64::MAX), t.finish_order()));

        by_finish
            .iter()
            .zip(by_end.iter())
            .all(|(a, b)| a.id() == b.id())
    }

    pub fn first_end_time(&self) -> Option<i64> {
        self.tasks().iter().filter_map(|t| t.end_time()).min()
    }

    pub fn last_end_time(&self) -> Option<i64> {
        self.tasks().iter().filter_map(|t| t.end_time()).max()
    }

    /// 成功批次因与前一批次交错而改判失败
    pub fn fail_out_of_sequence(&mut self) -> SchedulerResult<()> {
        if self.status != BatchStatus::Success {
            return Err(SchedulerError::invalid_transition(
                self.status,
                BatchStatus::Failed,
            ));
        }
        self.status = BatchStatus::Failed;
        Ok(())
    }

    pub fn in_flight_count(&mut self) -> usize {
        self.plan
            .tasks_mut()
            .iter_mut()
            .filter(|t| !t.status().is_terminal())
            .map(|t| t.is_running())
            .filter(|running| *running)
            .count()
    }

    /// 运行中但已无在途任务且超过宽限期仍未进入终态
    pub fn is_zombie(&mut self, now: i64, grace_ms: i64) -> bool {
        if self.status != BatchStatus::Running {
            return false;
        }
        if self.in_flight_count() > 0 {
            self.quiet_since = None;
            return false;
        }
        let since = *self.quiet_since.get_or_insert(now);
        now - since >= grace_ms
    }

    /// `now - expected_end < spacing` 视为按计划进行
    pub fn is_on_schedule(&self, now: i64) -> bool {
        match (self.status, self.expected_end_time) {
            (BatchStatus::Running, Some(expected)) => now - expected < self.plan.task_spacing_ms(),
            _ => true,
        }
    }

    /// 首次被判定延误时返回 true，同一批次只触发一次
    pub(crate) fn flag_late(&mut self) -> bool {
        if self.late_flagged {
            return false;
        }
        self.late_flagged = true;
        true
    }

    /// 各任务的计划与实际时间，用于诊断乱序
    pub fn timing_table(&self) -> String {
        let mut table = format!(
            "{:<12} {:<6} {:<6} {:<7} {:<9} {:<14} {:<14} {:<14} status\n",
            "kind", "finish", "start", "delay", "duration", "start_time", "execute_time", "end_time"
        );
        let mut tasks: Vec<&Task> = self.tasks().iter().collect();
        tasks.sort_by_key(|t| t.finish_order());
        let fmt_time = |t: Option<i64>| t.map_or_else(|| "-".to_string(), |v| v.to_string());
        for task in tasks {
            let _ = writeln!(
                table,
                "{:<12} {:<6} {:<6} {:<7} {:<9} {:<14} {:<14} {:<14} {}",
                task.kind().to_string(),
                task.finish_order(),
                task.start_order(),
                task.delay_ms(),
                task.duration_ms(),
                fmt_time(task.start_time()),
                fmt_time(task.execute_time()),
                fmt_time(task.end_time()),
                task.status()
            );
        }
        table
    }

    pub(crate) fn log_violation(&self, reason: &str) {
        warn!(
            target = %self.target(),
            batch_id = self.id,
            "{}\n{}",
            reason,
            self.timing_table()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batcher_core::OperationKind;
    use batcher_testing_utils::{
        CompletionMessageBuilder, MockProcessLauncher, RequirementSetBuilder,
    };

    fn job_with(kinds: &[(OperationKind, i64)]) -> BatchJob {
        let mut builder = RequirementSetBuilder::new();
        for (kind, duration) in kinds {
            builder = builder.with_requirement(*kind, 1, 1.0, *duration);
        }
        let plan = ExecutionPlan::from_requirements(
            "n00dles",
            PlanStrategy::Hwgw,
            builder.build(),
            100,
        )
        .unwrap();
        let mut job = BatchJob::new(3, plan);
        for task in job.tasks_mut() {
            task.assign_worker("home".to_string());
        }
        job
    }

    fn four_task_job() -> BatchJob {
        job_with(&[
            (OperationKind::Hack, 1000),
            (OperationKind::HackWeaken, 4000),
            (OperationKind::Grow, 3200),
            (OperationKind::GrowWeaken, 4000),
        ])
    }

    fn complete(job: &mut BatchJob, finish_order: u8, end: i64) {
        let id = job
            .tasks()
            .iter()
            .find(|t| t.finish_order() == finish_order)
            .unwrap()
            .id()
            .to_string();
        let message = CompletionMessageBuilder::new("n00dles", &id, job.id())
            .completed(end)
            .build();
        assert!(job.apply_update(&message));
    }

    #[test]
    fn test_run_dispatches_in_start_order() {
        let launcher = MockProcessLauncher::new();
        let mut job = four_task_job();
        job.run(&launcher, 1, 1_000).unwrap();

        assert_eq!(job.status(), BatchStatus::Running);
        assert_eq!(job.start_time(), Some(1_000));
        assert_eq!(job.expected_end_time(), Some(1_000 + 4300));

        let delays: Vec<i64> = launcher
            .launches()
            .iter()
            .map(|r| r.dispatch_delay_ms)
            .collect();
        let mut sorted = delays.clone();
        sorted.sort();
        assert_eq!(delays, sorted);
        assert!(launcher.launches().iter().all(|r| r.batch_id == 3));
    }

    #[test]
    fn test_run_twice_is_rejected() {
        let launcher = MockProcessLauncher::new();
        let mut job = four_task_job();
        job.run(&launcher, 1, 0).unwrap();
        assert!(matches!(
            job.run(&launcher, 1, 0),
            Err(SchedulerError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_dispatch_failure_fails_job_and_kills_launched_tasks() {
        let launcher = MockProcessLauncher::new().failing_on(2);
        let mut job = four_task_job();
        assert!(job.run(&launcher, 1, 0).is_err());
        assert_eq!(job.status(), BatchStatus::Failed);
        assert_eq!(launcher.launch_count(), 2);
        assert_eq!(launcher.killed_count(), 2);
    }

    #[test]
    fn test_success_when_completed_in_finish_order() {
        let launcher = MockProcessLauncher::new();
        let mut job = four_task_job();
        job.run(&launcher, 1, 0).unwrap();

        for (order, end) in [(0u8, 4000), (1, 4100), (2, 4200)] {
            complete(&mut job, order, end);
            assert_eq!(job.refresh_status(end), None);
        }
        complete(&mut job, 3, 4310);
        assert_eq!(job.refresh_status(4400), Some(BatchStatus::Success));
        assert_eq!(job.end_time(), Some(4310));
        assert_eq!(job.drift_ms(), 10);
        assert_eq!(job.refresh_status(4500), None);
    }

    #[test]
    fn test_swapped_pair_fails() {
        let launcher = MockProcessLauncher::new();
        let mut job = job_with(&[
            (OperationKind::Hack, 1000),
            (OperationKind::HackWeaken, 4000),
        ]);
        job.run(&launcher, 1, 0).unwrap();

        complete(&mut job, 1, 4100);
        complete(&mut job, 0, 4150);
        assert_eq!(job.refresh_status(4200), Some(BatchStatus::Failed));
        assert!(!job.finished_in_order());
        assert!(job.timing_table().contains("hack-weaken"));
    }

    #[test]
    fn test_any_swapped_adjacent_pair_fails() {
        for swap in 0..3u8 {
            let launcher = MockProcessLauncher::new();
            let mut job = four_task_job();
            job.run(&launcher, 1, 0).unwrap();

            let mut ends = [4000, 4100, 4200, 4300];
            ends.swap(usize::from(swap), usize::from(swap) + 1);
            for (order, end) in ends.iter().enumerate() {
                complete(&mut job, order as u8, *end);
            }
            assert_eq!(
                job.refresh_status(5000),
                Some(BatchStatus::Failed),
                "swap {swap}"
            );
        }
    }

    #[test]
    fn test_cancelled_task_cancels_job() {
        let launcher = MockProcessLauncher::new();
        let mut job = job_with(&[
            (OperationKind::Hack, 1000),
            (OperationKind::HackWeaken, 4000),
        ]);
        job.run(&launcher, 1, 0).unwrap();

        complete(&mut job, 0, 4000);
        let id = job
            .tasks()
            .iter()
            .find(|t| t.finish_order() == 1)
            .unwrap()
            .id()
            .to_string();
        let cancelled = CompletionMessageBuilder::new("n00dles", &id, 3)
            .cancelled(3000)
            .with_reason("drift 80ms exceeds tolerance 50ms")
            .build();
        job.apply_update(&cancelled);
        assert_eq!(job.refresh_status(4100), Some(BatchStatus::Cancelled));
    }

    #[test]
    fn test_cancel_transitions() {
        let launcher = MockProcessLauncher::new();
        let mut job = four_task_job();
        assert!(job.cancel(10));
        assert_eq!(job.status(), BatchStatus::Cancelled);
        assert!(!job.cancel(20));

        let mut job = four_task_job();
        job.run(&launcher, 1, 0).unwrap();
        assert!(job.cancel(50));
        assert_eq!(launcher.killed_count(), 4);
        assert!(job.tasks().iter().all(|t| t.status() == TaskStatus::Cancelled));
    }

    #[test]
    fn test_unknown_task_is_not_routed() {
        let mut job = four_task_job();
        let message = CompletionMessageBuilder::new("n00dles", "ffffffff", 3)
            .completed(10)
            .build();
        assert!(!job.apply_update(&message));
    }

    #[test]
    fn test_schedule_check() {
        let launcher = MockProcessLauncher::new();
        let mut job = four_task_job();
        assert!(job.is_on_schedule(1_000_000));

        job.run(&launcher, 1, 0).unwrap();
        assert!(job.is_on_schedule(4300));
        assert!(job.is_on_schedule(4399));
        assert!(!job.is_on_schedule(4400));
    }

    #[test]
    fn test_zombie_detection_after_grace() {
        let launcher = MockProcessLauncher::new();
        let mut job = four_task_job();
        job.run(&launcher, 1, 0).unwrap();

        assert!(!job.is_zombie(1000, 2000));
        launcher.finish_all();
        assert!(!job.is_zombie(5000, 2000));
        assert!(!job.is_zombie(6999, 2000));
        assert!(job.is_zombie(7000, 2000));
    }

    #[test]
    fn test_fail_out_of_sequence_only_from_success() {
        let mut job = four_task_job();
        assert!(job.fail_out_of_sequence().is_err());
    }
}
