use batcher_core::{CompletionMessage, CompletionSink, SchedulerError, SchedulerResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, info};

/// 完成通道统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub channel_id: u32,
    pub pending: usize,
    pub published: u64,
    pub drained: u64,
}

/// 创建有界完成通道
///
/// 写入端可任意克隆，交给各个远程操作；读取端只有调度器一个消费者。
pub fn completion_channel(
    channel_id: u32,
    capacity: usize,
) -> (CompletionPublisher, CompletionSubscriber) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let published = Arc::new(AtomicU64::new(0));
    info!("创建完成通道 {} (容量 {})", channel_id, capacity);

    (
        CompletionPublisher {
            sender,
            channel_id,
            published: published.clone(),
        },
        CompletionSubscriber {
            receiver,
            channel_id,
            published,
            drained: 0,
        },
    )
}

/// 完成通道写入端
#[derive(Debug, Clone)]
pub struct CompletionPublisher {
    sender: mpsc::Sender<CompletionMessage>,
    channel_id: u32,
    published: Arc<AtomicU64>,
}

impl CompletionPublisher {
    /// 写入一条JSON格式的完成消息
    pub fn publish_json(&self, json: &str) -> SchedulerResult<()> {
        let message = CompletionMessage::from_json(json)?;
        self.publish(&message)
    }
}

impl CompletionSink for CompletionPublisher {
    fn publish(&self, message: &CompletionMessage) -> SchedulerResult<()> {
        match self.sender.try_send(message.clone()) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(SchedulerError::MessageQueue(format!(
                "完成通道 {} 已满",
                self.channel_id
            ))),
            Err(TrySendError::Closed(_)) => Err(SchedulerError::MessageQueue(format!(
                "完成通道 {} 已关闭",
                self.channel_id
            ))),
        }
    }

    fn channel_id(&self) -> u32 {
        self.channel_id
    }
}

/// 完成通道读取端
#[derive(Debug)]
pub struct CompletionSubscriber {
    receiver: mpsc::Receiver<CompletionMessage>,
    channel_id: u32,
    published: Arc<AtomicU64>,
    drained: u64,
}

impl CompletionSubscriber {
    /// 取出当前所有待处理消息，不等待新消息
    pub fn drain(&mut self) -> Vec<CompletionMessage> {
        let mut messages = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(message) => messages.push(message),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.drained += messages.len() as u64;
        messages
    }

    /// 丢弃所有待处理消息
    pub fn clear(&mut self) -> usize {
        let dropped = self.drain().len();
        if dropped > 0 {
            debug!("清空完成通道 {}: 丢弃 {} 条消息", self.channel_id, dropped);
        }
        dropped
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            channel_id: self.channel_id,
            pending: self.receiver.len(),
            published: self.published.load(Ordering::Relaxed),
            drained: self.drained,
        }
    }
}
