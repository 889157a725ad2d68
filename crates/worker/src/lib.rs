//! # 远程操作执行
//!
//! 远程操作按完成通道协议运行：等待派发延迟、检查漂移、执行动作、报告结果。
//! [`LocalProcessLauncher`] 把每个操作作为独立的 tokio 任务启动。

pub mod launcher;
pub mod operation;

pub use launcher::{LocalProcessHandle, LocalProcessLauncher};
pub use operation::RemoteOperation;
