use crate::errors::SchedulerResult;
use crate::models::CompletionMessage;

/// 完成通道的写入端
pub trait CompletionSink: Send + Sync {
    fn publish(&self, message: &CompletionMessage) -> SchedulerResult<()>;

    fn channel_id(&self) -> u32;
}
