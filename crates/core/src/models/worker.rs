use serde::{Deserialize, Serialize};

/// 节点发现结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerSnapshot {
    pub hostname: String,
    pub max_capacity: f64,
}

/// 调度器持有的计算节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub hostname: String,
    pub max_capacity: f64,
    pub free_capacity: f64,
}

impl Worker {
    /// 创建新的Worker，初始容量全部空闲
    pub fn new<S: Into<String>>(hostname: S, max_capacity: f64) -> Self {
        Self {
            hostname: hostname.into(),
            max_capacity,
            free_capacity: max_capacity,
        }
    }

    /// 空闲容量严格大于需求时才可放置
    pub fn can_fit(&self, cost: f64) -> bool {
        self.free_capacity > cost
    }

    pub fn reserve(&mut self, cost: f64) -> bool {
        if !self.can_fit(cost) {
            return false;
        }
        self.free_capacity -= cost;
        true
    }

    pub fn release(&mut self, cost: f64) {
        self.free_capacity = (self.free_capacity + cost).min(self.max_capacity);
    }

    pub fn reserved_capacity(&self) -> f64 {
        self.max_capacity - self.free_capacity
    }

    /// 容量上调时同步增加空闲容量，已有预留不受影响
    pub fn apply_max_capacity(&mut self, max_capacity: f64) -> bool {
        if max_capacity <= self.max_capacity {
            return false;
        }
        let delta = max_capacity - self.max_capacity;
        self.max_capacity = max_capacity;
        self.free_capacity += delta;
        true
    }

    /// 获取Worker负载率
    pub fn load_percentage(&self) -> f64 {
        if self.max_capacity <= 0.0 {
            0.0
        } else {
            (self.reserved_capacity() / self.max_capacity) * 100.0
        }
    }
}

impl From<&WorkerSnapshot> for Worker {
    fn from(snapshot: &WorkerSnapshot) -> Self {
        Worker::new(snapshot.hostname.clone(), snapshot.max_capacity)
    }
}
