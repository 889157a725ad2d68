pub mod cluster;
pub mod completion;
pub mod estimator;
pub mod launcher;

pub use cluster::*;
pub use completion::*;
pub use estimator::*;
pub use launcher::*;

/// 毫秒级时间源
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}
