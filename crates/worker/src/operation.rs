use batcher_core::{
    Clock, CompletionMessage, CompletionSink, LaunchRequest, SchedulerResult, TargetBackend,
    TaskStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 一次远程操作的完整生命周期
pub struct RemoteOperation {
    request: LaunchRequest,
    backend: Arc<dyn TargetBackend>,
    sink: Arc<dyn CompletionSink>,
    clock: Arc<dyn Clock>,
    drift_tolerance_ms: i64,
}

impl RemoteOperation {
    pub fn new(
        request: LaunchRequest,
        backend: Arc<dyn TargetBackend>,
        sink: Arc<dyn CompletionSink>,
        clock: Arc<dyn Clock>,
        drift_tolerance_ms: i64,
    ) -> Self {
        Self {
            request,
            backend,
            sink,
            clock,
            drift_tolerance_ms,
        }
    }

    /// 运行操作并返回最终状态
    ///
    /// WAITING → 等待派发延迟 → 漂移超限则 CANCELLED，
    /// 否则 EXECUTING → 执行动作 → COMPLETED。
    pub async fn run(self) -> SchedulerResult<TaskStatus> {
        let start_time = self.clock.now_ms();
        let mut message = CompletionMessage::new(
            self.request.target.clone(),
            self.request.task_id.clone(),
            self.request.batch_id,
            TaskStatus::Waiting,
            start_time,
        );
        self.publish(&message);

        let delay_ms = self.request.dispatch_delay_ms.max(0);
        let waiting_since = Instant::now();
        tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
        let drift = waiting_since.elapsed().as_millis() as i64 - delay_ms;

        if drift > self.drift_tolerance_ms {
            message.status = TaskStatus::Cancelled;
            message.end_time = Some(self.clock.now_ms());
            message.reason = Some(format!(
                "drift {drift}ms exceeds tolerance {}ms",
                self.drift_tolerance_ms
            ));
            warn!(
                target = %self.request.target,
                task_id = %self.request.task_id,
                batch_id = self.request.batch_id,
                drift,
                "派发漂移超限，操作自行取消"
            );
            self.publish(&message);
            return Ok(TaskStatus::Cancelled);
        }

        message.status = TaskStatus::Executing;
        message.execute_time = Some(self.clock.now_ms());
        self.publish(&message);

        let observed = match self
            .backend
            .perform(
                &self.request.target,
                self.request.kind.action(),
                self.request.threads,
                self.request.expected_duration_ms,
            )
            .await
        {
            Ok(observed) => observed,
            Err(e) => {
                message.status = TaskStatus::Cancelled;
                message.end_time = Some(self.clock.now_ms());
                message.reason = Some(e.to_string());
                self.publish(&message);
                return Err(e);
            }
        };

        message.status = TaskStatus::Completed;
        message.end_time = Some(self.clock.now_ms());
        message.execute_observed_state = Some(observed);
        self.publish(&message);

        debug!(
            target = %self.request.target,
            task_id = %self.request.task_id,
            batch_id = self.request.batch_id,
            kind = %self.request.kind,
            "远程操作完成"
        );
        Ok(TaskStatus::Completed)
    }

    fn publish(&self, message: &CompletionMessage) {
        if let Err(e) = self.sink.publish(message) {
            warn!(
                task_id = %message.id,
                status = %message.status,
                "写入完成通道失败: {}",
                e
            );
        }
    }
}
