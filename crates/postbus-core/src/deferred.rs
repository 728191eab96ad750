//! Deferred delivery.
//!
//! A deferred bus has the exact contract of [`EventBus`], except that each
//! handler invocation is wrapped in a [`Task`] and handed to an [`Executor`]
//! instead of running inline. `post` returns as soon as every task has been
//! submitted, in snapshot order.
//!
//! ```text
//! post(event)
//!     │
//!     ├──► executor.execute(task 1) ──► handler1(event) ──► reporter on failure
//!     ├──► executor.execute(task 2) ──► handler2(event)
//!     └──► returns 2
//! ```
//!
//! Failures are caught and reported inside the task. There is no way to revoke
//! a task once it has been submitted.
//!
//! # Executors
//!
//! - [`SpawnExecutor`] (default) - one FIFO worker per executor
//! - [`DelayExecutor`] - the same worker, running each task after a fixed delay
//! - [`ManualExecutor`] - queues tasks until they are explicitly run
//! - any `Fn(Task) + Send + Sync` closure

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::SendError};
use tracing::{debug, error, trace};

use crate::dispatcher::{EventBus, EventBusBuilder};
use crate::reporter::ExceptionReporter;

/// One deferred handler invocation.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Schedules tasks for later execution.
pub trait Executor: Send + Sync {
    /// Schedules `task`. It must eventually run exactly once.
    fn execute(&self, task: Task);
}

impl<F> Executor for F
where
    F: Fn(Task) + Send + Sync,
{
    fn execute(&self, task: Task) {
        self(task)
    }
}

// ============================================================================
// Serial worker
// ============================================================================

struct Job {
    /// Earliest moment the task may run. `None` runs it as soon as possible.
    due: Option<Instant>,
    task: Task,
}

/// A FIFO drained by exactly one consumer.
///
/// The consumer is a tokio task when the first submission happens inside a
/// runtime, and a dedicated thread otherwise. It is restarted on the next
/// submission if it went away, e.g. because its runtime shut down.
#[derive(Clone, Default)]
struct SerialQueue {
    sender: Arc<Mutex<Option<UnboundedSender<Job>>>>,
}

impl SerialQueue {
    fn submit(&self, job: Job) {
        let mut sender = self.sender.lock();
        let job = match sender.as_ref() {
            Some(tx) => match tx.send(job) {
                Ok(()) => return,
                Err(SendError(job)) => {
                    debug!("Deferred worker is gone, restarting it");
                    job
                }
            },
            None => job,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        match start_worker(rx) {
            Ok(()) => {
                // The receiver lives in the new worker, so this cannot fail.
                let _ = tx.send(job);
                *sender = Some(tx);
            }
            Err(err) => {
                drop(sender);
                error!(error = %err, "Failed to start deferred worker, running task inline");
                run_job(job.task);
            }
        }
    }
}

fn start_worker(mut rx: UnboundedReceiver<Job>) -> std::io::Result<()> {
    if let Ok(handle) = Handle::try_current() {
        handle.spawn(async move {
            while let Some(job) = rx.recv().await {
                if let Some(due) = job.due {
                    tokio::time::sleep_until(due.into()).await;
                }
                run_job(job.task);
            }
        });
        return Ok(());
    }

    std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.into())
        .spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                if let Some(due) = job.due {
                    let wait = due.saturating_duration_since(Instant::now());
                    if !wait.is_zero() {
                        std::thread::sleep(wait);
                    }
                }
                run_job(job.task);
            }
            trace!("Deferred worker thread exiting");
        })
        .map(drop)
}

/// Runs one task. A panic escaping the task (a failing exception reporter)
/// is logged so the tasks queued behind it still run.
fn run_job(task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("Deferred task panicked");
    }
}

/// Name of the thread draining the queue when no tokio runtime is available.
pub const WORKER_THREAD_NAME: &str = "postbus-deferred";

// ============================================================================
// Executors
// ============================================================================

/// Runs tasks one at a time, in submission order, after the posting code has
/// moved on.
///
/// Each executor owns one queue and one consumer, so no two tasks submitted
/// to it overlap. Inside a tokio runtime the consumer is a spawned task that
/// runs once the posting code yields; outside one it is a thread named
/// [`WORKER_THREAD_NAME`], started on first use. Clones share the queue.
#[derive(Clone, Default)]
pub struct SpawnExecutor {
    queue: SerialQueue,
}

impl SpawnExecutor {
    /// Creates an executor with its own queue.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for SpawnExecutor {
    fn execute(&self, task: Task) {
        self.queue.submit(Job { due: None, task });
    }
}

impl std::fmt::Debug for SpawnExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnExecutor").finish_non_exhaustive()
    }
}

/// Runs every task a fixed delay after it was submitted.
///
/// Shares the serial model of [`SpawnExecutor`]: one consumer, FIFO. Since
/// the delay is constant, due times never decrease along the queue.
#[derive(Clone)]
pub struct DelayExecutor {
    delay: Duration,
    queue: SerialQueue,
}

impl DelayExecutor {
    /// Creates an executor delaying each task by `delay`.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            queue: SerialQueue::default(),
        }
    }

    /// Returns the configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Executor for DelayExecutor {
    fn execute(&self, task: Task) {
        self.queue.submit(Job {
            due: Some(Instant::now() + self.delay),
            task,
        });
    }
}

impl std::fmt::Debug for DelayExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayExecutor")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Collects tasks in FIFO order until they are run explicitly.
///
/// Clones share the same queue, so one clone can be handed to the bus while
/// another is kept for stepping.
#[derive(Clone, Default)]
pub struct ManualExecutor {
    queue: Arc<Mutex<VecDeque<Task>>>,
}

impl ManualExecutor {
    /// Creates an executor with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs the oldest queued task. Returns `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        // Pop before running so the task may submit more work.
        let task = self.queue.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs queued tasks, including ones submitted meanwhile, until the queue
    /// is empty. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, task: Task) {
        self.queue.lock().push_back(task);
    }
}

impl std::fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}

// ============================================================================
// Deferred bus
// ============================================================================

/// An [`EventBus`] whose handler invocations go through an [`Executor`].
///
/// Derefs to [`EventBus`], so the whole bus API is available.
#[derive(Debug, Clone)]
pub struct DeferredEventBus {
    bus: EventBus,
}

impl Default for DeferredEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredEventBus {
    /// Creates a deferred bus on the [`SpawnExecutor`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a deferred bus on `executor`.
    pub fn with_executor(executor: impl Executor + 'static) -> Self {
        Self::builder().executor(executor).build()
    }

    /// Returns a builder for a deferred bus.
    pub fn builder() -> DeferredEventBusBuilder {
        DeferredEventBusBuilder::default()
    }

    pub(crate) fn from_bus(bus: EventBus) -> Self {
        debug_assert!(bus.is_deferred());
        Self { bus }
    }

    /// Returns the underlying bus handle.
    pub fn as_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Unwraps the underlying bus handle. It keeps delivering through the
    /// executor.
    pub fn into_inner(self) -> EventBus {
        self.bus
    }
}

impl std::ops::Deref for DeferredEventBus {
    type Target = EventBus;

    fn deref(&self) -> &Self::Target {
        &self.bus
    }
}

/// Builder for [`DeferredEventBus`]. Without an explicit executor the bus
/// gets its own [`SpawnExecutor`].
#[derive(Default)]
pub struct DeferredEventBusBuilder {
    inner: EventBusBuilder,
}

impl DeferredEventBusBuilder {
    /// Sets the sink for handler failures.
    pub fn exception_reporter(mut self, reporter: impl ExceptionReporter + 'static) -> Self {
        self.inner = self.inner.exception_reporter(reporter);
        self
    }

    /// Sets the executor every handler invocation goes through.
    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.inner = self.inner.executor(executor);
        self
    }

    pub fn build(self) -> DeferredEventBus {
        self.inner.build_deferred()
    }
}
