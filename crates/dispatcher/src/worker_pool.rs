use batcher_core::{SchedulerError, SchedulerResult, Worker, WorkerSnapshot};
use tracing::{debug, info, warn};

use crate::task::Task;

/// 全局容量池，只由调度线程访问
#[derive(Debug, Clone, Default)]
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshots(snapshots: &[WorkerSnapshot]) -> Self {
        let mut pool = Self::new();
        pool.refresh(snapshots);
        pool
    }

    /// 合并最新的节点发现结果，返回新增或扩容的节点数
    pub fn refresh(&mut self, snapshots: &[WorkerSnapshot]) -> usize {
        let mut changed = 0;
        for snapshot in snapshots {
            match self
                .workers
                .iter_mut()
                .find(|w| w.hostname == snapshot.hostname)
            {
                Some(worker) => {
                    let previous = worker.max_capacity;
                    if worker.apply_max_capacity(snapshot.max_capacity) {
                        info!(
                            "Worker {} 容量上调: {} -> {}",
                            worker.hostname, previous, worker.max_capacity
                        );
                        changed += 1;
                    }
                }
                None => {
                    info!(
                        "发现新Worker: {} (容量 {})",
                        snapshot.hostname, snapshot.max_capacity
                    );
                    self.workers.push(Worker::from(snapshot));
                    changed += 1;
                }
            }
        }
        changed
    }

    /// 为每个任务依次选择第一个空闲容量足够的节点
    ///
    /// 任一任务无法放置时回滚本次调用中的全部预留。
    pub fn reserve(&mut self, tasks: &mut [Task]) -> SchedulerResult<()> {
        let mut reserved = Vec::with_capacity(tasks.len());

        for index in 0..tasks.len() {
            if tasks[index].worker().is_some() {
                continue;
            }
            let cost = tasks[index].requirement().capacity_cost();
            let Some(slot) = self.workers.iter().position(|w| w.can_fit(cost)) else {
                for &held in &reserved {
                    self.release_task(&mut tasks[held]);
                }
                debug!(
                    task_id = %tasks[index].id(),
                    cost = cost,
                    free = self.free_capacity(),
                    "容量不足，回滚预留"
                );
                return Err(SchedulerError::capacity_exhausted(format!(
                    "没有空闲容量大于 {cost} 的Worker"
                )));
            };

            let worker = &mut self.workers[slot];
            worker.reserve(cost);
            tasks[index].assign_worker(worker.hostname.clone());
            reserved.push(index);
        }
        Ok(())
    }

    /// 归还任务占用的容量；未持有节点的任务跳过
    pub fn release(&mut self, tasks: &mut [Task]) -> usize {
        let mut released = 0;
        for task in tasks.iter_mut() {
            if self.release_task(task) {
                released += 1;
            }
        }
        released
    }

    fn release_task(&mut self, task: &mut Task) -> bool {
        let Some(hostname) = task.take_worker() else {
            return false;
        };
        let cost = task.requirement().capacity_cost();
        match self.workers.iter_mut().find(|w| w.hostname == hostname) {
            Some(worker) => {
                worker.release(cost);
                true
            }
            None => {
                warn!("释放容量时找不到Worker: {}", hostname);
                false
            }
        }
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn get(&self, hostname: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.hostname == hostname)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn total_capacity(&self) -> f64 {
        self.workers.iter().map(|w| w.max_capacity).sum()
    }

    pub fn free_capacity(&self) -> f64 {
        self.workers.iter().map(|w| w.free_capacity).sum()
    }

    pub fn reserved_capacity(&self) -> f64 {
        self.workers.iter().map(|w| w.reserved_capacity()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batcher_core::{OperationKind, ResourceRequirement};

    fn task(kind: OperationKind, cost: f64) -> Task {
        Task::new(
            "n00dles",
            kind,
            ResourceRequirement::new(1, cost, 1000).unwrap(),
        )
    }

    fn snapshot(hostname: &str, max_capacity: f64) -> WorkerSnapshot {
        WorkerSnapshot {
            hostname: hostname.to_string(),
            max_capacity,
        }
    }

    fn assert_conserved(pool: &WorkerPool, tasks: &[Task]) {
        for worker in pool.workers() {
            let held: f64 = tasks
                .iter()
                .filter(|t| t.worker() == Some(worker.hostname.as_str()))
                .map(|t| t.requirement().capacity_cost())
                .sum();
            assert!(
                (worker.free_capacity + held - worker.max_capacity).abs() < 1e-9,
                "capacity not conserved on {}",
                worker.hostname
            );
        }
    }

    #[test]
    fn test_second_reservation_fails_without_touching_first() {
        let mut pool = WorkerPool::from_snapshots(&[snapshot("home", 10.0)]);
        let mut first = vec![task(OperationKind::Hack, 6.0)];
        let mut second = vec![task(OperationKind::Grow, 6.0)];

        pool.reserve(&mut first).unwrap();
        assert!(matches!(
            pool.reserve(&mut second),
            Err(SchedulerError::CapacityExhausted(_))
        ));

        assert_eq!(first[0].worker(), Some("home"));
        assert_eq!(second[0].worker(), None);
        assert_eq!(pool.get("home").unwrap().free_capacity, 4.0);

        assert_eq!(pool.release(&mut second), 0);
        assert_eq!(pool.get("home").unwrap().free_capacity, 4.0);
        assert_conserved(&pool, &first);
    }

    #[test]
    fn test_reservation_is_all_or_nothing() {
        let mut pool =
            WorkerPool::from_snapshots(&[snapshot("home", 8.0), snapshot("pserv-0", 4.0)]);
        let mut tasks = vec![
            task(OperationKind::Hack, 5.0),
            task(OperationKind::HackWeaken, 3.0),
            task(OperationKind::Grow, 2.0),
            task(OperationKind::GrowWeaken, 5.0),
        ];

        assert!(pool.reserve(&mut tasks).is_err());
        assert!(tasks.iter().all(|t| t.worker().is_none()));
        assert_eq!(pool.free_capacity(), 12.0);
        assert_eq!(pool.reserved_capacity(), 0.0);
    }

    #[test]
    fn test_first_fit_with_strict_comparison() {
        let mut pool =
            WorkerPool::from_snapshots(&[snapshot("home", 4.0), snapshot("pserv-0", 8.0)]);
        let mut tasks = vec![
            task(OperationKind::Hack, 4.0),
            task(OperationKind::Grow, 1.0),
        ];

        pool.reserve(&mut tasks).unwrap();
        assert_eq!(tasks[0].worker(), Some("pserv-0"));
        assert_eq!(tasks[1].worker(), Some("home"));
        assert_conserved(&pool, &tasks);

        assert_eq!(pool.release(&mut tasks), 2);
        assert_eq!(pool.release(&mut tasks), 0);
        assert_eq!(pool.free_capacity(), 12.0);
    }

    #[test]
    fn test_refresh_adds_and_upgrades_workers() {
        let mut pool = WorkerPool::from_snapshots(&[snapshot("home", 8.0)]);
        let mut tasks = vec![task(OperationKind::Hack, 3.0)];
        pool.reserve(&mut tasks).unwrap();

        let changed = pool.refresh(&[snapshot("home", 16.0), snapshot("pserv-0", 4.0)]);
        assert_eq!(changed, 2);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get("home").unwrap().free_capacity, 13.0);
        assert_conserved(&pool, &tasks);

        assert_eq!(pool.refresh(&[snapshot("home", 8.0)]), 0);
        assert_eq!(pool.get("home").unwrap().max_capacity, 16.0);
        assert_eq!(pool.total_capacity(), 20.0);
    }
}
