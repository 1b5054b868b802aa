//! Bounded-concurrency task scheduler.
//!
//! Units of work are queued FIFO and admitted while a permit is free. The
//! permit count is `floor(parallelism * cpu_percentage / 100)`. Every
//! submission and every completion triggers a dispatch attempt; attempts that
//! find no free permit or an empty queue return without side effects, so any
//! number of them may race on the same queue and counter.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, trace, warn};

use crate::config::SchedulerConfig;
use crate::core::{SchedulerError, TaskError};
use crate::util::serde::TaskId;

/// Status of a unit in the scheduler lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TaskStatus {
    /// Unit is queued waiting for a permit.
    Queued,
    /// Unit is running.
    Running,
    /// Unit finished successfully.
    Completed,
    /// Unit failed with a reason.
    Failed(String),
    /// Unit was removed from the queue before it started.
    Dropped(String),
}

impl TaskStatus {
    /// Whether the unit has reached a final state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Dropped(_))
    }
}

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Outcome delivered to completion callbacks and task handles.
pub type TaskOutcome<T> = Result<T, TaskError>;

/// Completion callback, invoked once with the unit's outcome.
pub type Callback<T> = Box<dyn FnOnce(TaskOutcome<T>) + Send + 'static>;

/// Queue-depth notification published on enqueue, admission and clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    /// Units waiting for a permit.
    pub queued: usize,
    /// Units in the tracked collection (any state).
    pub tracked: usize,
}

/// Statistics about scheduler utilization.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Maximum concurrently running units.
    pub concurrency_limit: usize,
    /// Permits currently held.
    pub permits_in_use: usize,
    /// Units waiting in the queue.
    pub queued: usize,
    /// Units in the tracked collection.
    pub tracked: usize,
    /// Total units submitted.
    pub submitted: u64,
    /// Total units completed successfully.
    pub completed: u64,
    /// Total units that failed.
    pub failed: u64,
    /// Total units dropped from the queue.
    pub dropped: u64,
    /// Number of tracked-collection compactions so far.
    pub compactions: u64,
}

#[derive(Debug, Default)]
struct SchedulerCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// A submitted unit waiting for admission.
struct QueuedUnit {
    id: TaskId,
    status: watch::Sender<TaskStatus>,
    run: Box<dyn FnOnce() -> BoxFuture<'static, TaskStatus> + Send>,
}

/// Status subscription kept for `wait_all` and compaction.
struct TrackedUnit {
    status: watch::Receiver<TaskStatus>,
}

struct SchedulerShared {
    limit: usize,
    max_queue_depth: usize,
    compaction_threshold: usize,
    /// Permits currently held (lock-free).
    permits: AtomicUsize,
    pending_tx: Sender<QueuedUnit>,
    pending_rx: Receiver<QueuedUnit>,
    tracked: Mutex<Vec<TrackedUnit>>,
    depth_tx: watch::Sender<QueueDepth>,
    counters: SchedulerCounters,
    /// Bumped on every compaction of `tracked`.
    generation: AtomicU64,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl SchedulerShared {
    /// Try to take one permit using a CAS loop. Never blocks.
    fn try_reserve_permit(&self) -> bool {
        let mut current = self.permits.load(Ordering::Acquire);
        loop {
            if current >= self.limit {
                return false;
            }
            match self.permits.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn release_permit(&self) {
        self.permits.fetch_sub(1, Ordering::Release);
    }

    fn publish_depth(&self) {
        let tracked = self.tracked.lock().len();
        self.depth_tx.send_replace(QueueDepth {
            queued: self.pending_rx.len(),
            tracked,
        });
    }

    /// Drop terminal handles once the tracked collection reaches the threshold.
    ///
    /// `wait_all` works on cloned receivers, so removing an entry here never
    /// affects a wait already in progress.
    fn compact_if_needed(&self) {
        let mut tracked = self.tracked.lock();
        if tracked.len() < self.compaction_threshold {
            return;
        }
        let before = tracked.len();
        tracked.retain(|t| !t.status.borrow().is_terminal());
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            before = before,
            after = tracked.len(),
            generation = generation,
            "compacted tracked tasks"
        );
    }

    fn record_terminal(&self, status: &TaskStatus) {
        match status {
            TaskStatus::Completed => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            TaskStatus::Failed(_) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

/// Handle to a submitted unit.
///
/// Dropping the handle does not cancel the unit.
pub struct TaskHandle<T> {
    id: TaskId,
    status: watch::Receiver<TaskStatus>,
    result: oneshot::Receiver<TaskOutcome<T>>,
}

impl<T> TaskHandle<T> {
    /// Scheduler-assigned task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status.borrow().clone()
    }

    /// Whether the unit has reached a final state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status.borrow().is_terminal()
    }

    /// Wait for the unit's outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Abandoned`] if the unit was cleared from the
    /// queue before it ran.
    pub async fn join(self) -> Result<TaskOutcome<T>, SchedulerError> {
        let id = self.id;
        self.result.await.map_err(|_| SchedulerError::Abandoned(id))
    }
}

/// Concurrency-bounded FIFO scheduler for asynchronous units of work.
///
/// # Example
///
/// ```rust,ignore
/// use prometheus_source_poller::config::SchedulerConfig;
/// use prometheus_source_poller::core::TaskScheduler;
/// use prometheus_source_poller::runtime::TokioSpawner;
///
/// let scheduler = TaskScheduler::new(&SchedulerConfig::default(), TokioSpawner::current())?;
/// scheduler.submit_with(
///     || async { Ok::<_, TaskError>(42) },
///     |outcome| println!("finished: {outcome:?}"),
/// )?;
/// scheduler.wait_all().await;
/// ```
pub struct TaskScheduler<S> {
    shared: Arc<SchedulerShared>,
    spawner: S,
}

impl<S: Clone> Clone for TaskScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            spawner: self.spawner.clone(),
        }
    }
}

impl<S> TaskScheduler<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a scheduler sized from the host's available parallelism.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if the configuration is
    /// invalid or yields a concurrency limit of zero.
    pub fn new(config: &SchedulerConfig, spawner: S) -> Result<Self, SchedulerError> {
        Self::with_parallelism(config, num_cpus::get(), spawner)
    }

    /// Create a scheduler for an explicit parallelism value.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if the configuration is
    /// invalid or yields a concurrency limit of zero.
    pub fn with_parallelism(
        config: &SchedulerConfig,
        parallelism: usize,
        spawner: S,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let limit = config.concurrency_for(parallelism);
        if limit == 0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "{}% of {parallelism} available cores leaves no room to run tasks",
                config.cpu_percentage
            )));
        }

        let (pending_tx, pending_rx) = unbounded();
        let (depth_tx, _) = watch::channel(QueueDepth::default());

        info!(
            concurrency_limit = limit,
            parallelism = parallelism,
            cpu_percentage = config.cpu_percentage,
            "task scheduler initialized"
        );

        Ok(Self {
            shared: Arc::new(SchedulerShared {
                limit,
                max_queue_depth: config.max_queue_depth,
                compaction_threshold: config.compaction_threshold,
                permits: AtomicUsize::new(0),
                pending_tx,
                pending_rx,
                tracked: Mutex::new(Vec::new()),
                depth_tx,
                counters: SchedulerCounters::default(),
                generation: AtomicU64::new(0),
                next_id: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
            spawner,
        })
    }

    /// Submit a unit of work with an optional completion callback.
    ///
    /// Never blocks: the unit is queued and a dispatch attempt is made. The
    /// callback receives the outcome exactly once after the unit finishes,
    /// unless the unit is cleared from the queue first, in which case it is
    /// never called. Errors and panics raised by the unit are captured as
    /// [`TaskError`] and never retried.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::Closed`] after [`TaskScheduler::close`]
    /// - [`SchedulerError::QueueFull`] when the pending queue is at its maximum depth
    pub fn submit<T, F, Fut>(
        &self,
        work: F,
        on_complete: Option<Callback<T>>,
    ) -> Result<TaskHandle<T>, SchedulerError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskOutcome<T>> + Send + 'static,
    {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::Closed);
        }
        let queued = self.shared.pending_rx.len();
        if queued >= self.shared.max_queue_depth {
            warn!(queued = queued, "task rejected: queue full");
            return Err(SchedulerError::QueueFull(format!(
                "max queue depth {} reached",
                self.shared.max_queue_depth
            )));
        }

        self.shared.compact_if_needed();

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (status_tx, status_rx) = watch::channel(TaskStatus::Queued);
        let (result_tx, result_rx) = oneshot::channel();

        let run = Box::new(move || -> BoxFuture<'static, TaskStatus> {
            async move {
                let outcome = match AssertUnwindSafe(async move { work().await })
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(panic) => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
                };
                let status = match &outcome {
                    Ok(_) => TaskStatus::Completed,
                    Err(e) => TaskStatus::Failed(e.to_string()),
                };
                deliver(id, outcome, result_tx, on_complete);
                status
            }
            .boxed()
        });

        self.shared.tracked.lock().push(TrackedUnit {
            status: status_rx.clone(),
        });
        self.shared
            .pending_tx
            .send(QueuedUnit {
                id,
                status: status_tx,
                run,
            })
            .map_err(|_| SchedulerError::Closed)?;

        // `close` may have drained the queue between the check above and the
        // send. Drop the unit unless a dispatch already admitted it.
        if self.shared.closed.load(Ordering::Acquire) {
            self.clear_queued();
            if matches!(*status_rx.borrow(), TaskStatus::Dropped(_)) {
                debug!(task_id = id, "task dropped: scheduler closed during submit");
                return Err(SchedulerError::Closed);
            }
        }

        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.publish_depth();
        debug!(task_id = id, "task enqueued");

        Self::dispatch(&self.shared, &self.spawner);

        Ok(TaskHandle {
            id,
            status: status_rx,
            result: result_rx,
        })
    }

    /// Submit a unit of work with a completion callback.
    ///
    /// # Errors
    ///
    /// Same as [`TaskScheduler::submit`].
    pub fn submit_with<T, F, Fut, C>(
        &self,
        work: F,
        on_complete: C,
    ) -> Result<TaskHandle<T>, SchedulerError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskOutcome<T>> + Send + 'static,
        C: FnOnce(TaskOutcome<T>) + Send + 'static,
    {
        self.submit(work, Some(Box::new(on_complete)))
    }

    /// Admit queued units while permits are free.
    ///
    /// An attempt that finds the queue empty or the scheduler closed returns
    /// without touching the permit counter.
    fn dispatch(shared: &Arc<SchedulerShared>, spawner: &S) {
        loop {
            if shared.pending_rx.is_empty() || shared.closed.load(Ordering::Acquire) {
                break;
            }
            if !shared.try_reserve_permit() {
                trace!("no free permit, dispatch attempt exits");
                break;
            }

            let Ok(unit) = shared.pending_rx.try_recv() else {
                // Another attempt took the unit. Re-check the queue in case a
                // submit enqueued while we held the permit.
                shared.release_permit();
                continue;
            };

            let QueuedUnit { id, status, run } = unit;
            status.send_replace(TaskStatus::Running);
            shared.publish_depth();
            debug!(
                task_id = id,
                permits_in_use = shared.permits.load(Ordering::Acquire),
                "task admitted"
            );

            let shared_clone = Arc::clone(shared);
            let spawner_clone = spawner.clone();
            spawner.spawn(async move {
                let terminal = run().await;
                shared_clone.record_terminal(&terminal);
                debug!(task_id = id, status = ?terminal, "task finished");
                // Permit goes back before the status turns terminal, so a
                // drained scheduler holds no permits. `running()` may briefly
                // count this unit alongside its successor.
                shared_clone.release_permit();
                status.send_replace(terminal);
                Self::dispatch(&shared_clone, &spawner_clone);
            });
        }
    }

    /// Wait until every unit tracked at call time reaches a terminal state.
    ///
    /// Units submitted after the snapshot is taken are not covered. Returns
    /// the number of units awaited.
    pub async fn wait_all(&self) -> usize {
        let snapshot: Vec<watch::Receiver<TaskStatus>> = self
            .shared
            .tracked
            .lock()
            .iter()
            .map(|t| t.status.clone())
            .collect();
        let count = snapshot.len();

        join_all(snapshot.into_iter().map(|mut rx| async move {
            // A closed channel means the unit was discarded with the scheduler.
            if rx.wait_for(TaskStatus::is_terminal).await.is_err() {
                trace!("status channel closed before terminal state");
            }
        }))
        .await;

        debug!(awaited = count, "wait_all complete");
        count
    }

    /// Drop every unit that has not started. Running units are unaffected and
    /// dropped units never invoke their callback. Returns the number dropped.
    pub fn clear_queued(&self) -> usize {
        let mut dropped = 0;
        while let Ok(unit) = self.shared.pending_rx.try_recv() {
            unit.status
                .send_replace(TaskStatus::Dropped("cleared from queue".into()));
            dropped += 1;
        }
        if dropped > 0 {
            self.shared
                .counters
                .dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
            info!(dropped = dropped, "cleared queued tasks");
        }
        self.shared.publish_depth();
        dropped
    }

    /// Reject further submissions and drop queued units. Running units finish.
    pub fn close(&self) -> usize {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        info!("task scheduler closing");
        self.clear_queued()
    }

    /// Subscribe to queue-depth notifications.
    #[must_use]
    pub fn subscribe_depth(&self) -> watch::Receiver<QueueDepth> {
        self.shared.depth_tx.subscribe()
    }

    /// Maximum concurrently running units.
    #[must_use]
    pub fn concurrency_limit(&self) -> usize {
        self.shared.limit
    }

    /// Units waiting for a permit.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.pending_rx.len()
    }

    /// Tracked units currently in the `Running` state.
    ///
    /// A finishing unit returns its permit just before its status turns
    /// terminal, so this can momentarily read one above the concurrency limit
    /// while its successor starts. After [`TaskScheduler::wait_all`] it is zero
    /// for the awaited units.
    #[must_use]
    pub fn running(&self) -> usize {
        self.shared
            .tracked
            .lock()
            .iter()
            .filter(|t| *t.status.borrow() == TaskStatus::Running)
            .count()
    }

    /// Units in the tracked collection.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.shared.tracked.lock().len()
    }

    /// Number of tracked-collection compactions so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Snapshot of scheduler statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let counters = &self.shared.counters;
        SchedulerStats {
            concurrency_limit: self.shared.limit,
            permits_in_use: self.shared.permits.load(Ordering::Relaxed),
            queued: self.queued(),
            tracked: self.tracked(),
            submitted: counters.submitted.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            compactions: self.generation(),
        }
    }
}

/// Hand the outcome to the handle (if still held) and the callback.
fn deliver<T: Clone>(
    id: TaskId,
    outcome: TaskOutcome<T>,
    result_tx: oneshot::Sender<TaskOutcome<T>>,
    on_complete: Option<Callback<T>>,
) {
    if let Err(e) = &outcome {
        debug!(task_id = id, error = %e, "task failed");
    }
    let Some(callback) = on_complete else {
        let _ = result_tx.send(outcome);
        return;
    };
    if !result_tx.is_closed() {
        let _ = result_tx.send(outcome.clone());
    }
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
        error!(
            task_id = id,
            panic = %panic_message(panic.as_ref()),
            "completion callback panicked"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::TokioSpawner;
    use std::time::Duration;

    fn scheduler(parallelism: usize) -> TaskScheduler<TokioSpawner> {
        let config = SchedulerConfig {
            cpu_percentage: 100,
            ..SchedulerConfig::default()
        };
        TaskScheduler::with_parallelism(&config, parallelism, TokioSpawner::current()).unwrap()
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed("x".into()).is_terminal());
        assert!(TaskStatus::Dropped("x".into()).is_terminal());
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let config = SchedulerConfig {
            cpu_percentage: 60,
            ..SchedulerConfig::default()
        };
        let result = TaskScheduler::with_parallelism(&config, 1, TokioSpawner::current());
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_join_returns_value() {
        let scheduler = scheduler(2);
        let handle = scheduler
            .submit(|| async { Ok::<_, TaskError>(21 * 2) }, None)
            .unwrap();
        assert_eq!(handle.join().await.unwrap(), Ok(42));
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let scheduler = scheduler(1);
        let handle = scheduler
            .submit(
                || async {
                    if true {
                        panic!("unit exploded");
                    }
                    Ok::<u32, TaskError>(1)
                },
                None,
            )
            .unwrap();
        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome, Err(TaskError::Panicked("unit exploded".into())));

        // The permit was released, so later work still runs.
        let handle = scheduler
            .submit(|| async { Ok::<_, TaskError>(7) }, None)
            .unwrap();
        assert_eq!(handle.join().await.unwrap(), Ok(7));
    }

    #[tokio::test]
    async fn test_compaction_drops_only_terminal() {
        let config = SchedulerConfig {
            cpu_percentage: 100,
            compaction_threshold: 4,
            ..SchedulerConfig::default()
        };
        let scheduler =
            TaskScheduler::with_parallelism(&config, 1, TokioSpawner::current()).unwrap();

        for i in 0..4 {
            scheduler
                .submit(move || async move { Ok::<_, TaskError>(i) }, None)
                .unwrap();
        }
        scheduler.wait_all().await;
        assert_eq!(scheduler.tracked(), 4);

        let gate = Arc::new(tokio::sync::Notify::new());
        let release = Arc::clone(&gate);
        let blocked = scheduler
            .submit(
                move || async move {
                    release.notified().await;
                    Ok::<_, TaskError>(99)
                },
                None,
            )
            .unwrap();

        assert_eq!(scheduler.generation(), 1);
        assert_eq!(scheduler.tracked(), 1);
        assert!(!blocked.is_finished());

        gate.notify_one();
        assert_eq!(blocked.join().await.unwrap(), Ok(99));
    }

    #[tokio::test]
    async fn test_depth_notifications() {
        let scheduler = scheduler(1);
        let mut depth = scheduler.subscribe_depth();
        let gate = Arc::new(tokio::sync::Notify::new());
        let release = Arc::clone(&gate);
        scheduler
            .submit(
                move || async move {
                    release.notified().await;
                    Ok::<_, TaskError>(())
                },
                None,
            )
            .unwrap();
        scheduler
            .submit(|| async { Ok::<_, TaskError>(()) }, None)
            .unwrap();

        assert!(depth.has_changed().unwrap());
        let current = *depth.borrow_and_update();
        assert_eq!(current, QueueDepth { queued: 1, tracked: 2 });

        gate.notify_one();
        tokio::time::timeout(Duration::from_secs(5), scheduler.wait_all())
            .await
            .unwrap();
        assert_eq!(depth.borrow().queued, 0);
    }
}
