use std::cmp::Ordering;
use std::collections::HashSet;

use batcher_core::TargetProfile;
use tracing::debug;

/// 当前能力下可以操作该目标
pub fn is_eligible(profile: &TargetProfile, capability: f64) -> bool {
    profile.required_capability <= capability
}

/// 所需能力低于 `capability / divisor` 的易攻目标
pub fn is_easy(profile: &TargetProfile, capability: f64, threshold_divisor: f64) -> bool {
    profile.required_capability < capability / threshold_divisor
}

/// 易攻目标优先，其次产出潜力高者，再次最大容量高者
fn priority(a: &(bool, TargetProfile), b: &(bool, TargetProfile)) -> Ordering {
    let ((a_easy, a), (b_easy, b)) = (a, b);
    b_easy
        .cmp(a_easy)
        .then(b.growth_rate.total_cmp(&a.growth_rate))
        .then(b.max_available.total_cmp(&a.max_available))
        .then_with(|| a.name.cmp(&b.name))
}

/// 尚未分配运行器的目标，按优先级排序
#[derive(Debug, Clone, Default)]
pub struct TargetQueue {
    pending: Vec<TargetProfile>,
}

impl TargetQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以最新的目标列表重建队列，跳过已分配和能力不足的目标
    pub fn refresh(
        &mut self,
        profiles: Vec<TargetProfile>,
        capability: f64,
        threshold_divisor: f64,
        assigned: &HashSet<String>,
    ) {
        let total = profiles.len();
        let mut ranked: Vec<(bool, TargetProfile)> = profiles
            .into_iter()
            .filter(|p| !assigned.contains(&p.name))
            .filter(|p| is_eligible(p, capability))
            .map(|p| (is_easy(&p, capability, threshold_divisor), p))
            .collect();
        ranked.sort_by(priority);
        let easy = ranked.iter().filter(|(easy, _)| *easy).count();
        self.pending = ranked.into_iter().map(|(_, p)| p).collect();
        debug!(
            discovered = total,
            pending = self.pending.len(),
            easy = easy,
            capability = capability,
            "目标队列已刷新"
        );
    }

    pub fn pop_next(&mut self) -> Option<TargetProfile> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetProfile> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
