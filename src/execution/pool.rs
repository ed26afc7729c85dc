//! Bounded execution worker pool. Grounded on
//! `original_source/pkg/execution/{pool,concurrent}.go`: a priority queue
//! feeds a capacity-bounded set of workers, each execution watchdogged at
//! 30 seconds, with pool statistics readable as a single consistent
//! snapshot (the teacher's `monitor::Stats` copy-out idiom).
//!
//! Dispatch is settlement-free by design: a dispatched task is marked
//! `Completed` as soon as it starts, with `actual_profit` set to the
//! opportunity's estimated net profit. The original's `executeArbitrageLogic`
//! is an explicit placeholder ("temporarily return success directly") rather
//! than real dual-venue order placement, and this crate keeps that contract
//! unchanged — the `VenueExecutor` trait below is fully wired so a future
//! revision can compose real placement without reshaping the pool.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use super::executor::VenueExecutor;
use super::queue::{ExecutionTask, QueueEmptyError, QueueFullError, TaskQueue};
use crate::engine::ArbitrageOpportunity;
use crate::symbol::Symbol;

const DEFAULT_WATCHDOG: Duration = Duration::from_secs(30);
const DISPATCH_IDLE_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("queue full: {0}")]
    QueueFull(#[from] QueueFullError),
    #[error("pool is stopped")]
    Stopped,
    #[error("execution timed out")]
    Timeout,
    #[error("execution canceled")]
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Canceled,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub task_id: u64,
    pub opportunity_id: String,
    pub symbol: Symbol,
    pub buy_venue: String,
    pub sell_venue: String,
    pub amount: f64,
    pub est_profit: f64,
    pub actual_profit: f64,
    pub status: ExecutionStatus,
    pub error_message: Option<String>,
    pub started_at: Instant,
    pub completed_at: Option<Instant>,
}

#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub active_tasks: usize,
    pub worker_capacity: usize,
    pub running: bool,
    pub total_executed: u64,
    pub total_success: u64,
    pub total_failed: u64,
    pub total_canceled: u64,
    pub total_profit: f64,
}

pub struct WorkerPool {
    min_workers: usize,
    max_workers: usize,
    watchdog: Duration,
    queue: Mutex<TaskQueue>,
    stats: Mutex<PoolStats>,
    semaphore: Arc<Semaphore>,
    active_tasks: AtomicUsize,
    running: AtomicBool,
    /// Result channels for in-flight `execute()` callers, keyed by task id.
    /// A worker delivers into this map when it finishes; a caller that times
    /// out or cancels removes its own entry so a late delivery is dropped
    /// silently rather than erroring.
    pending_results: Mutex<HashMap<u64, oneshot::Sender<ExecutionResult>>>,
    /// Venue executors wired in purely to validate dispatch plumbing
    /// (§4.5's settlement-free contract calls into them without placing
    /// real orders) — keyed by venue id.
    executors: HashMap<String, Arc<dyn VenueExecutor>>,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        let min_workers = max_workers.min(5).max(1);
        Self::with_min_workers(min_workers, max_workers)
    }

    pub fn with_min_workers(min_workers: usize, max_workers: usize) -> Self {
        let max_workers = max_workers.max(min_workers).max(1);
        Self {
            min_workers,
            max_workers,
            watchdog: DEFAULT_WATCHDOG,
            queue: Mutex::new(TaskQueue::new(max_workers * 200)),
            stats: Mutex::new(PoolStats {
                worker_capacity: max_workers,
                ..PoolStats::default()
            }),
            semaphore: Arc::new(Semaphore::new(max_workers)),
            active_tasks: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            pending_results: Mutex::new(HashMap::new()),
            executors: HashMap::new(),
        }
    }

    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub fn with_executors(mut self, executors: HashMap<String, Arc<dyn VenueExecutor>>) -> Self {
        self.executors = executors;
        self
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn min_workers(&self) -> usize {
        self.min_workers
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Enqueues an opportunity for execution, returning its queue-assigned
    /// task id. Does not block; the dispatch loop picks it up according to
    /// priority (`profit_rate`).
    pub fn submit(&self, opportunity: ArbitrageOpportunity, amount: f64) -> Result<u64, PoolError> {
        if !self.is_running() {
            return Err(PoolError::Stopped);
        }
        Ok(self.queue.lock().enqueue(opportunity, amount)?)
    }

    /// Enqueues `opportunity` and waits for its result, per §4.5's
    /// `execute()` contract: returns once the task completes, `cancellation`
    /// fires, or the 30s watchdog elapses.
    pub async fn execute(
        &self,
        opportunity: ArbitrageOpportunity,
        amount: f64,
        cancellation: CancellationToken,
    ) -> Result<ExecutionResult, PoolError> {
        if !self.is_running() {
            return Err(PoolError::Stopped);
        }
        let (tx, rx) = oneshot::channel();
        let task_id = self.queue.lock().enqueue(opportunity.clone(), amount)?;
        self.pending_results.lock().insert(task_id, tx);

        let outcome = tokio::select! {
            _ = cancellation.cancelled() => Err(PoolError::Canceled),
            res = tokio::time::timeout(self.watchdog, rx) => match res {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(_)) => Err(PoolError::Stopped),
                Err(_) => Err(PoolError::Timeout),
            },
        };

        if outcome.is_ok() {
            return outcome;
        }

        // The caller gave up before a worker delivered a result. If the task
        // never left the queue, cancel it outright so pool stats stay
        // internally consistent; otherwise a worker already owns it and its
        // result simply has no listener left.
        self.pending_results.lock().remove(&task_id);
        if self.queue.lock().remove(task_id) {
            let now = Instant::now();
            let result = ExecutionResult {
                task_id,
                opportunity_id: opportunity.id,
                symbol: opportunity.symbol,
                buy_venue: opportunity.buy_venue,
                sell_venue: opportunity.sell_venue,
                amount,
                est_profit: opportunity.net_profit,
                actual_profit: 0.0,
                status: ExecutionStatus::Canceled,
                error_message: Some("canceled before dispatch".to_string()),
                started_at: now,
                completed_at: Some(now),
            };
            self.record_result(&result);
        }
        outcome
    }

    pub fn status(&self) -> PoolStats {
        let mut snapshot = self.stats.lock().clone();
        snapshot.active_tasks = self.active_tasks.load(Ordering::SeqCst);
        snapshot.running = self.is_running();
        snapshot
    }

    pub fn queue_size(&self) -> usize {
        self.queue.lock().size()
    }

    /// Dispatch loop: while the pool is running, pulls the highest-priority
    /// task and spawns it on a permit from the bounded semaphore, enforcing
    /// `max_workers` concurrency. Intended to be spawned once via
    /// `tokio::spawn` and run for the pool's lifetime.
    pub async fn run_dispatch_loop(self: Arc<Self>) {
        loop {
            if !self.is_running() {
                tokio::time::sleep(DISPATCH_IDLE_POLL).await;
                continue;
            }
            let task = {
                let mut queue = self.queue.lock();
                queue.dequeue()
            };
            let task = match task {
                Ok(task) => task,
                Err(QueueEmptyError) => {
                    tokio::time::sleep(DISPATCH_IDLE_POLL).await;
                    continue;
                }
            };
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let pool = Arc::clone(&self);
            self.active_tasks.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let task_id = task.id;
                let result = pool.execute_task(task).await;
                pool.deliver(task_id, result);
                drop(permit);
                pool.active_tasks.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }

    async fn execute_task(&self, task: ExecutionTask) -> ExecutionResult {
        let started_at = Instant::now();
        let opportunity = task.opportunity.clone();

        // Validates the executor wiring without placing a real order: the
        // settlement-free contract still reaches into each venue's
        // `get_order_book` so a future revision can compose real placement
        // on top without reshaping the pool (see module docs).
        self.validate_executor_wiring(&opportunity).await;

        let watchdogged = tokio::time::timeout(self.watchdog, run_settlement_free(opportunity.clone(), task.amount));
        let outcome = AssertUnwindSafe(watchdogged).catch_unwind().await;

        let (status, actual_profit, error_message) = match outcome {
            Ok(Ok(profit)) => (ExecutionStatus::Completed, profit, None),
            Ok(Err(_elapsed)) => (ExecutionStatus::Failed, 0.0, Some("execution timed out".to_string())),
            Err(panic) => {
                let reason = panic_message(&panic);
                error!(task_id = task.id, reason, "execution task panicked");
                (ExecutionStatus::Failed, 0.0, Some(reason))
            }
        };

        ExecutionResult {
            task_id: task.id,
            opportunity_id: opportunity.id,
            symbol: opportunity.symbol,
            buy_venue: opportunity.buy_venue,
            sell_venue: opportunity.sell_venue,
            amount: task.amount,
            est_profit: opportunity.net_profit,
            actual_profit,
            status,
            error_message,
            started_at,
            completed_at: Some(Instant::now()),
        }
    }

    /// Calls `get_order_book` on both legs' executors, if wired, logging
    /// rather than failing the task on error — this is a plumbing check, not
    /// part of the settlement-free profit calculation.
    async fn validate_executor_wiring(&self, opportunity: &ArbitrageOpportunity) {
        let venue_symbol = opportunity.symbol.to_string();
        for venue in [&opportunity.buy_venue, &opportunity.sell_venue] {
            if let Some(executor) = self.executors.get(venue) {
                if let Err(err) = executor.get_order_book(&venue_symbol, 5).await {
                    warn!(venue, %err, "executor wiring check failed");
                }
            }
        }
    }

    /// Records `result` in the running stats, then hands it off to a
    /// blocked `execute()` caller if one is still waiting.
    fn deliver(&self, task_id: u64, result: ExecutionResult) {
        self.record_result(&result);
        if let Some(tx) = self.pending_results.lock().remove(&task_id) {
            let _ = tx.send(result);
        }
    }

    fn record_result(&self, result: &ExecutionResult) {
        let mut stats = self.stats.lock();
        stats.total_executed += 1;
        match result.status {
            ExecutionStatus::Completed => {
                stats.total_success += 1;
                stats.total_profit += result.actual_profit;
            }
            ExecutionStatus::Canceled => {
                stats.total_canceled += 1;
            }
            _ => {
                stats.total_failed += 1;
                warn!(task_id = result.task_id, "execution task did not complete successfully");
            }
        }
    }
}

/// The settlement-free dispatch contract: no dual-venue order is placed,
/// the opportunity's estimated net profit is taken as the realized profit.
async fn run_settlement_free(opportunity: ArbitrageOpportunity, _amount: f64) -> f64 {
    opportunity.net_profit
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
