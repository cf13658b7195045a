//! Worker pool scheduler for one channel's pending items.
//!
//! [`Scheduler::start`] returns a [`SchedulerHandle`] immediately; the work
//! runs on a supervisor task that owns up to `max_threads` worker tasks.
//!
//! # Concurrency Model
//!
//! - Items are queued FIFO in the order given; workers pop from one shared
//!   queue, so items *start* in that order while completions may interleave
//! - The queue and the in-flight set are `std::sync::Mutex`es, never held
//!   across an `.await`
//! - Claiming (pop, `in_progress` write, `ItemStarted`) is serialized by an
//!   async turn lock; fetches run concurrently
//! - Each claimed item is written `in_progress` before its fetch starts and
//!   `completed`, `failed`, or back to `pending` afterwards
//!
//! # Cancellation
//!
//! [`SchedulerHandle::stop`] (or any clone of [`SchedulerHandle::stop_signal`])
//! raises a shared flag. Workers stop claiming items and fetch adapters return
//! early. If workers have not drained after the grace period they are
//! aborted, and every item still in flight is written back as `pending`.
//! `BatchFinished` is emitted on every path that ends a started run, aborted
//! or not.
//!
//! # Example
//!
//! ```ignore
//! let handle = Scheduler::new(4)?.start(
//!     "veritasium",
//!     pending_items,
//!     fetcher,
//!     store,
//!     reporter,
//! );
//! let report = handle.join().await?;
//! println!("completed {}, failed {}", report.completed, report.failed);
//! ```

mod persistence;
mod worker;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::fetch::Fetcher;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::stop::StopSignal;
use crate::store::{Item, ItemId, ItemRepository, ItemState};

/// Minimum allowed worker count.
pub const MIN_THREADS: usize = 1;

/// How long a stopped run may take to drain before workers are aborted.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Error type for scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Invalid worker count provided.
    #[error("invalid thread count {value}: must be at least {MIN_THREADS}")]
    InvalidThreadCount {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The supervisor task panicked.
    #[error("scheduler task failed: {0}")]
    Supervisor(String),
}

/// Tunables beyond the worker count.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Write a JSON sidecar next to every fetched file.
    pub write_sidecars: bool,
    /// Drain window after a stop request.
    pub grace_period: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            write_sidecars: false,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Outcome counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Items fetched and recorded complete.
    pub completed: usize,
    /// Items whose fetch or completion write failed.
    pub failed: usize,
    /// Items put back to pending because the run was stopped.
    pub cancelled: usize,
    /// True when the run was stopped before the queue drained.
    pub interrupted: bool,
}

impl BatchReport {
    /// Number of items that reached a terminal state in this run.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

/// Atomic counters updated by concurrent workers.
#[derive(Debug, Default)]
pub(crate) struct BatchStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl BatchStats {
    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }

    fn report(&self, interrupted: bool) -> BatchReport {
        BatchReport {
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
            interrupted,
        }
    }
}

/// State shared by the supervisor and its workers.
pub(crate) struct RunContext {
    channel: String,
    queue: Mutex<VecDeque<Item>>,
    claim_turn: tokio::sync::Mutex<()>,
    in_flight: Mutex<HashMap<ItemId, Item>>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn ItemRepository>,
    reporter: ProgressReporter,
    stop: StopSignal,
    stats: BatchStats,
    write_sidecars: bool,
    finished: Arc<AtomicBool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunContext {
    fn next_item(&self) -> Option<Item> {
        lock(&self.queue).pop_front()
    }

    fn track(&self, item: &Item) {
        lock(&self.in_flight).insert(item.id.clone(), item.clone());
    }

    fn untrack(&self, id: &str) {
        lock(&self.in_flight).remove(id);
    }

    fn take_in_flight(&self) -> Vec<Item> {
        lock(&self.in_flight).drain().map(|(_, item)| item).collect()
    }
}

/// Configured worker pool; cheap to create per run.
#[derive(Debug, Clone)]
pub struct Scheduler {
    max_threads: usize,
    options: SchedulerOptions,
}

impl Scheduler {
    /// Creates a scheduler running at most `max_threads` workers.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidThreadCount`] if the value is below
    /// [`MIN_THREADS`]. There is no upper bound; `start` clamps the worker
    /// count to the number of queued items.
    pub fn new(max_threads: usize) -> Result<Self, SchedulerError> {
        if max_threads < MIN_THREADS {
            return Err(SchedulerError::InvalidThreadCount { value: max_threads });
        }
        Ok(Self {
            max_threads,
            options: SchedulerOptions::default(),
        })
    }

    #[must_use]
    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Starts fetching `pending` and returns without waiting.
    ///
    /// Duplicate ids are dropped (first occurrence wins). The worker count is
    /// clamped to the number of items. An empty set yields a handle that is
    /// already finished and emits no events.
    #[instrument(skip(self, pending, fetcher, store, reporter), fields(channel = %channel, max_threads = self.max_threads))]
    pub fn start(
        &self,
        channel: &str,
        pending: Vec<Item>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn ItemRepository>,
        reporter: ProgressReporter,
    ) -> SchedulerHandle {
        let stop = StopSignal::new();
        let queue = dedupe(pending);
        if queue.is_empty() {
            debug!("nothing pending");
            return SchedulerHandle {
                run: None,
                monitor: RunMonitor {
                    stop,
                    finished: Arc::new(AtomicBool::new(true)),
                },
                grace_period: self.options.grace_period,
            };
        }

        let threads = self.max_threads.min(queue.len());
        info!(items = queue.len(), threads, "starting batch");
        let finished = Arc::new(AtomicBool::new(false));

        let ctx = Arc::new(RunContext {
            channel: channel.to_string(),
            queue: Mutex::new(queue),
            claim_turn: tokio::sync::Mutex::new(()),
            in_flight: Mutex::new(HashMap::new()),
            fetcher,
            store,
            reporter,
            stop: stop.clone(),
            stats: BatchStats::default(),
            write_sidecars: self.options.write_sidecars,
            finished: Arc::clone(&finished),
        });

        let supervisor = tokio::spawn(supervise(Arc::clone(&ctx), threads));
        SchedulerHandle {
            run: Some(Run { ctx, supervisor }),
            monitor: RunMonitor { stop, finished },
            grace_period: self.options.grace_period,
        }
    }
}

/// Starts a run with default options.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidThreadCount`] for a zero `max_threads`.
pub fn start(
    channel: &str,
    pending: Vec<Item>,
    max_threads: usize,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn ItemRepository>,
    reporter: ProgressReporter,
) -> Result<SchedulerHandle, SchedulerError> {
    Ok(Scheduler::new(max_threads)?.start(channel, pending, fetcher, store, reporter))
}

fn dedupe(pending: Vec<Item>) -> VecDeque<Item> {
    let mut seen = HashSet::new();
    pending
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}

async fn supervise(ctx: Arc<RunContext>, threads: usize) -> BatchReport {
    let mut workers = JoinSet::new();
    for worker_id in 0..threads {
        workers.spawn(worker::run_worker(Arc::clone(&ctx), worker_id));
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(error) = joined {
            warn!(%error, "worker task panicked");
        }
    }
    // Only a panicked worker leaves an item behind here.
    requeue_in_flight(&ctx).await;

    let interrupted = ctx.stop.is_stopped()
        && (!lock(&ctx.queue).is_empty() || ctx.stats.cancelled.load(Ordering::SeqCst) > 0);
    let report = ctx.stats.report(interrupted);
    info!(
        completed = report.completed,
        failed = report.failed,
        cancelled = report.cancelled,
        "batch finished"
    );
    ctx.reporter.emit(ProgressEvent::BatchFinished {
        completed: report.completed,
        failed: report.failed,
    });
    ctx.finished.store(true, Ordering::SeqCst);
    report
}

struct Run {
    ctx: Arc<RunContext>,
    supervisor: JoinHandle<BatchReport>,
}

/// Cloneable view of a run: request a stop or check whether it ended.
#[derive(Debug, Clone)]
pub struct RunMonitor {
    stop: StopSignal,
    finished: Arc<AtomicBool>,
}

impl RunMonitor {
    /// Raises the run's stop signal.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Returns true once no worker of the run is left.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Handle to a running batch.
pub struct SchedulerHandle {
    run: Option<Run>,
    monitor: RunMonitor,
    grace_period: Duration,
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("finished", &self.is_finished())
            .field("stopped", &self.monitor.stop.is_stopped())
            .finish_non_exhaustive()
    }
}

impl SchedulerHandle {
    /// Cloneable signal that stops this run when raised.
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.monitor.stop.clone()
    }

    #[must_use]
    pub fn monitor(&self) -> RunMonitor {
        self.monitor.clone()
    }

    /// Returns true once every worker has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.monitor.is_finished()
    }

    /// Waits for the run to end.
    ///
    /// If a stop is requested while waiting (through any clone of the stop
    /// signal), this behaves like [`Self::stop`].
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Supervisor`] if the supervisor task panicked.
    pub async fn join(self) -> Result<BatchReport, SchedulerError> {
        let Some(mut run) = self.run else {
            return Ok(BatchReport::default());
        };
        tokio::select! {
            joined = &mut run.supervisor => return finish(joined),
            () = self.monitor.stop.cancelled() => {}
        }
        drain(run, self.grace_period).await
    }

    /// Stops the run and waits until no item is left `in_progress`.
    ///
    /// No new item starts after this is called. In-flight fetches get the
    /// grace period to finish or abort; stragglers are then aborted and
    /// written back as `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Supervisor`] if the supervisor task panicked.
    pub async fn stop(self) -> Result<BatchReport, SchedulerError> {
        self.monitor.stop();
        let Some(run) = self.run else {
            return Ok(BatchReport::default());
        };
        drain(run, self.grace_period).await
    }
}

fn finish(
    joined: Result<BatchReport, tokio::task::JoinError>,
) -> Result<BatchReport, SchedulerError> {
    joined.map_err(|e| SchedulerError::Supervisor(e.to_string()))
}

#[instrument(skip(run), fields(channel = %run.ctx.channel))]
async fn drain(mut run: Run, grace_period: Duration) -> Result<BatchReport, SchedulerError> {
    if let Ok(joined) = tokio::time::timeout(grace_period, &mut run.supervisor).await {
        return finish(joined);
    }

    warn!(
        grace_ms = grace_period.as_millis(),
        "workers did not drain in time, aborting"
    );
    run.supervisor.abort();
    // Dropping the supervisor's JoinSet aborts the workers with it.
    if let Ok(report) = (&mut run.supervisor).await {
        // Finished on its own between the timeout and the abort.
        return Ok(report);
    }

    requeue_in_flight(&run.ctx).await;
    let report = run.ctx.stats.report(true);
    run.ctx.reporter.emit(ProgressEvent::BatchFinished {
        completed: report.completed,
        failed: report.failed,
    });
    run.ctx.finished.store(true, Ordering::SeqCst);
    Ok(report)
}

/// Writes every item still marked in flight back as `pending`.
async fn requeue_in_flight(ctx: &RunContext) {
    for mut item in ctx.take_in_flight() {
        item.state = ItemState::Pending;
        if let Err(error) = ctx.store.upsert_item(&ctx.channel, &item).await {
            warn!(item_id = %item.id, %error, "failed to requeue in-flight item");
        }
        ctx.stats.increment_cancelled();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_scheduler_new_valid_thread_counts() {
        assert_eq!(Scheduler::new(1).unwrap().max_threads(), 1);
        assert_eq!(Scheduler::new(64).unwrap().max_threads(), 64);
        assert_eq!(Scheduler::new(1000).unwrap().max_threads(), 1000);
    }

    #[test]
    fn test_scheduler_new_rejects_zero() {
        assert!(matches!(
            Scheduler::new(0),
            Err(SchedulerError::InvalidThreadCount { value: 0 })
        ));
    }

    #[test]
    fn test_scheduler_error_display() {
        let msg = SchedulerError::InvalidThreadCount { value: 0 }.to_string();
        assert!(msg.contains("invalid thread count 0"));
        assert!(msg.contains("at least 1"));
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence_in_order() {
        let items = ["a", "b", "a", "c", "b"]
            .into_iter()
            .map(|id| Item::new(id, PathBuf::from(id)))
            .collect();
        let ids: Vec<ItemId> = dedupe(items).into_iter().map(|item| item.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_batch_stats_report() {
        let stats = BatchStats::default();
        stats.increment_completed();
        stats.increment_completed();
        stats.increment_failed();
        stats.increment_cancelled();

        let report = stats.report(false);
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.total(), 3);
        assert!(!report.interrupted);
    }

    #[test]
    fn test_batch_stats_thread_safe() {
        let stats = Arc::new(BatchStats::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.increment_completed();
                        stats.increment_failed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let report = stats.report(false);
        assert_eq!(report.completed, 800);
        assert_eq!(report.failed, 800);
    }
}
