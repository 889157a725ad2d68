use serde::{Deserialize, Serialize};
use std::fmt;

/// 远程进程实际执行的动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RemoteAction {
    #[serde(rename = "HACK")]
    Hack,
    #[serde(rename = "GROW")]
    Grow,
    #[serde(rename = "WEAKEN")]
    Weaken,
}

impl fmt::Display for RemoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteAction::Hack => write!(f, "hack"),
            RemoteAction::Grow => write!(f, "grow"),
            RemoteAction::Weaken => write!(f, "weaken"),
        }
    }
}

/// 批次中的操作类型
///
/// 声明顺序即批次内的预期完成顺序。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    #[serde(rename = "HACK")]
    Hack,
    #[serde(rename = "HACK_WEAKEN")]
    HackWeaken,
    #[serde(rename = "GROW")]
    Grow,
    #[serde(rename = "GROW_WEAKEN")]
    GrowWeaken,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Hack,
        OperationKind::HackWeaken,
        OperationKind::Grow,
        OperationKind::GrowWeaken,
    ];

    /// 批次内的预期完成名次
    pub fn finish_order(self) -> u8 {
        match self {
            OperationKind::Hack => 0,
            OperationKind::HackWeaken => 1,
            OperationKind::Grow => 2,
            OperationKind::GrowWeaken => 3,
        }
    }

    pub fn action(self) -> RemoteAction {
        match self {
            OperationKind::Hack => RemoteAction::Hack,
            OperationKind::HackWeaken | OperationKind::GrowWeaken => RemoteAction::Weaken,
            OperationKind::Grow => RemoteAction::Grow,
        }
    }

    /// 属于把目标恢复到基线状态的操作
    pub fn restores_baseline(self) -> bool {
        self.finish_order() > 1
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Hack => write!(f, "hack"),
            OperationKind::HackWeaken => write!(f, "hack-weaken"),
            OperationKind::Grow => write!(f, "grow"),
            OperationKind::GrowWeaken => write!(f, "grow-weaken"),
        }
    }
}
