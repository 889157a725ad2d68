use chrono::Utc;
use tokio::time::Instant;

use crate::traits::Clock;

/// 以启动时刻的墙钟时间为基准、按单调时钟推进的时间源
///
/// 基于 tokio 的 `Instant`，在暂停时间的测试中随虚拟时间推进。
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    base_epoch_ms: i64,
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now().timestamp_millis())
    }

    pub fn starting_at(base_epoch_ms: i64) -> Self {
        Self {
            base_epoch_ms,
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        self.base_epoch_ms + self.origin.elapsed().as_millis() as i64
    }
}
