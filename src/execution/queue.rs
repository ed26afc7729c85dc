//! Bounded max-priority task queue, ordered by opportunity profit rate.
//! Grounded on `original_source/pkg/execution/queue.go`'s `container/heap`
//! wrapper, ported to `std::collections::BinaryHeap`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::engine::ArbitrageOpportunity;

#[derive(Debug, Error)]
#[error("task queue is full ({size}/{max_size})")]
pub struct QueueFullError {
    pub size: usize,
    pub max_size: usize,
}

#[derive(Debug, Error)]
#[error("task queue is empty")]
pub struct QueueEmptyError;

/// A unit of execution work: an opportunity sized for trading, awaiting a
/// worker.
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    pub id: u64,
    pub opportunity: ArbitrageOpportunity,
    pub amount: f64,
    pub created_at: Instant,
}

#[derive(Debug, Clone)]
struct QueuedTask {
    task: ExecutionTask,
    priority: f64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}
impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(Ordering::Equal)
    }
}

/// Max-heap of pending execution tasks, prioritized by `profit_rate`, the
/// same priority function the original's `Enqueue` uses.
pub struct TaskQueue {
    heap: BinaryHeap<QueuedTask>,
    max_size: usize,
    next_id: u64,
}

impl TaskQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            max_size,
            next_id: 0,
        }
    }

    pub fn enqueue(&mut self, opportunity: ArbitrageOpportunity, amount: f64) -> Result<u64, QueueFullError> {
        if self.heap.len() >= self.max_size {
            return Err(QueueFullError {
                size: self.heap.len(),
                max_size: self.max_size,
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        let priority = opportunity.profit_rate;
        let task = ExecutionTask {
            id,
            opportunity,
            amount,
            created_at: Instant::now(),
        };
        self.heap.push(QueuedTask { task, priority });
        Ok(id)
    }

    pub fn dequeue(&mut self) -> Result<ExecutionTask, QueueEmptyError> {
        self.heap.pop().map(|q| q.task).ok_or(QueueEmptyError)
    }

    pub fn peek(&self) -> Option<&ExecutionTask> {
        self.heap.peek().map(|q| &q.task)
    }

    pub fn size(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.max_size
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Removes every task that has waited longer than `timeout`, returning
    /// how many were dropped.
    pub fn remove_expired(&mut self, timeout: Duration) -> usize {
        let now = Instant::now();
        let before = self.heap.len();
        let remaining: Vec<QueuedTask> = self
            .heap
            .drain()
            .filter(|q| now.duration_since(q.task.created_at) <= timeout)
            .collect();
        self.heap = remaining.into_iter().collect();
        before - self.heap.len()
    }

    /// Returns the tasks that have waited longer than `timeout`, without
    /// removing them.
    pub fn get_expired(&self, timeout: Duration) -> Vec<ExecutionTask> {
        let now = Instant::now();
        self.heap
            .iter()
            .filter(|q| now.duration_since(q.task.created_at) > timeout)
            .map(|q| q.task.clone())
            .collect()
    }

    /// Removes a single queued task by id, returning whether it was present.
    /// A task already claimed by a worker (no longer in the queue) cannot be
    /// removed this way.
    pub fn remove(&mut self, task_id: u64) -> bool {
        let before = self.heap.len();
        let remaining: Vec<QueuedTask> = self.heap.drain().filter(|q| q.task.id != task_id).collect();
        self.heap = remaining.into_iter().collect();
        self.heap.len() != before
    }

    /// Re-prioritizes a queued task, returning whether it was found.
    pub fn update_priority(&mut self, task_id: u64, new_priority: f64) -> bool {
        let mut items: Vec<QueuedTask> = self.heap.drain().collect();
        let mut found = false;
        for item in items.iter_mut() {
            if item.task.id == task_id {
                item.priority = new_priority;
                found = true;
            }
        }
        self.heap = items.into_iter().collect();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;
    use std::time::Duration as StdDuration;

    fn opp(profit_rate: f64) -> ArbitrageOpportunity {
        let now = Instant::now();
        ArbitrageOpportunity {
            id: "x".to_string(),
            symbol: "BTC/USDT".parse::<Symbol>().unwrap(),
            buy_venue: "binance".to_string(),
            sell_venue: "okx".to_string(),
            buy_price: 100.0,
            sell_price: 101.0,
            price_diff: 1.0,
            price_diff_rate: 0.01,
            revenue_rate: 0.01,
            est_revenue: 10.0,
            est_cost: 2.0,
            net_profit: 8.0,
            profit_rate,
            risk_score: 20.0,
            score: 70.0,
            discovered_at: now,
            valid_until: now + StdDuration::from_secs(5),
        }
    }

    #[test]
    fn dequeues_highest_profit_rate_first() {
        let mut queue = TaskQueue::new(10);
        queue.enqueue(opp(0.01), 100.0).unwrap();
        queue.enqueue(opp(0.05), 100.0).unwrap();
        queue.enqueue(opp(0.02), 100.0).unwrap();
        let first = queue.dequeue().unwrap();
        assert_eq!(first.opportunity.profit_rate, 0.05);
        let second = queue.dequeue().unwrap();
        assert_eq!(second.opportunity.profit_rate, 0.02);
    }

    #[test]
    fn enqueue_errors_when_full() {
        let mut queue = TaskQueue::new(1);
        queue.enqueue(opp(0.01), 100.0).unwrap();
        assert!(queue.enqueue(opp(0.02), 100.0).is_err());
    }

    #[test]
    fn dequeue_errors_when_empty() {
        let mut queue = TaskQueue::new(1);
        assert!(queue.dequeue().is_err());
    }

    #[test]
    fn remove_expired_drops_old_tasks_only() {
        let mut queue = TaskQueue::new(10);
        queue.enqueue(opp(0.01), 100.0).unwrap();
        std::thread::sleep(StdDuration::from_millis(10));
        queue.enqueue(opp(0.02), 100.0).unwrap();
        let removed = queue.remove_expired(StdDuration::from_millis(5));
        assert_eq!(removed, 1);
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn get_expired_reports_without_removing() {
        let mut queue = TaskQueue::new(10);
        queue.enqueue(opp(0.01), 100.0).unwrap();
        std::thread::sleep(StdDuration::from_millis(10));
        let expired = queue.get_expired(StdDuration::from_millis(5));
        assert_eq!(expired.len(), 1);
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn remove_drops_queued_task_by_id() {
        let mut queue = TaskQueue::new(10);
        let id = queue.enqueue(opp(0.01), 100.0).unwrap();
        assert!(queue.remove(id));
        assert!(queue.is_empty());
        assert!(!queue.remove(id));
    }

    #[test]
    fn update_priority_changes_dequeue_order() {
        let mut queue = TaskQueue::new(10);
        let low_id = queue.enqueue(opp(0.01), 100.0).unwrap();
        queue.enqueue(opp(0.02), 100.0).unwrap();
        assert!(queue.update_priority(low_id, 0.5));
        let first = queue.dequeue().unwrap();
        assert_eq!(first.id, low_id);
    }
}
