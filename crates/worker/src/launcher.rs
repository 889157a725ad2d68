use batcher_core::{
    Clock, CompletionSink, LaunchRequest, ProcessHandle, ProcessLauncher, SchedulerError,
    SchedulerResult, TargetBackend,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::operation::RemoteOperation;

/// 在当前 tokio 运行时上以独立任务运行远程操作
pub struct LocalProcessLauncher {
    backend: Arc<dyn TargetBackend>,
    sink: Arc<dyn CompletionSink>,
    clock: Arc<dyn Clock>,
    drift_tolerance_ms: i64,
    next_pid: AtomicU64,
}

impl LocalProcessLauncher {
    pub fn new(
        backend: Arc<dyn TargetBackend>,
        sink: Arc<dyn CompletionSink>,
        clock: Arc<dyn Clock>,
        drift_tolerance_ms: i64,
    ) -> Self {
        Self {
            backend,
            sink,
            clock,
            drift_tolerance_ms,
            next_pid: AtomicU64::new(1),
        }
    }
}

impl ProcessLauncher for LocalProcessLauncher {
    fn launch(&self, request: &LaunchRequest) -> SchedulerResult<Box<dyn ProcessHandle>> {
        let runtime = Handle::try_current()
            .map_err(|e| SchedulerError::spawn(request.task_id.clone(), e.to_string()))?;
        if request.channel_id != self.sink.channel_id() {
            return Err(SchedulerError::spawn(
                request.task_id.clone(),
                format!(
                    "未知的完成通道 {} (当前 {})",
                    request.channel_id,
                    self.sink.channel_id()
                ),
            ));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let operation = RemoteOperation::new(
            request.clone(),
            self.backend.clone(),
            self.sink.clone(),
            self.clock.clone(),
            self.drift_tolerance_ms,
        );
        let task_id = request.task_id.clone();

        let join = runtime.spawn(async move {
            match operation.run().await {
                Ok(status) => {
                    debug!(pid, task_id = %task_id, status = %status, "远程操作退出")
                }
                Err(e) => warn!(pid, task_id = %task_id, "远程操作异常退出: {}", e),
            }
        });

        debug!(
            pid,
            task_id = %request.task_id,
            worker = %request.worker,
            threads = request.threads,
            delay_ms = request.dispatch_delay_ms,
            "启动远程操作"
        );
        Ok(Box::new(LocalProcessHandle { pid, join }))
    }
}

/// [`LocalProcessLauncher`] 启动的操作句柄，`kill` 会中止对应任务
#[derive(Debug)]
pub struct LocalProcessHandle {
    pid: u64,
    join: JoinHandle<()>,
}

impl ProcessHandle for LocalProcessHandle {
    fn pid(&self) -> u64 {
        self.pid
    }

    fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    fn kill(&self) {
        self.join.abort();
    }
}
