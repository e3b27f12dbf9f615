//! The worker/queue engine shared by every pool shape.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error};

use trellis_core::constants::{DEFAULT_THREAD_NAME, THREAD_NAME_KEY};
use trellis_core::Url;

use crate::reject;
use crate::thread_pool::ExecutorError;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// The work-queue shape selected by the `queues` URL parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Zero capacity: a task is accepted only when a worker is waiting.
    Handoff,
    /// Unbounded FIFO.
    Unbounded,
    /// FIFO bounded at the given capacity.
    Bounded(usize),
}

impl QueueKind {
    /// Maps the `queues` parameter: `0` → hand-off, negative → unbounded,
    /// positive → bounded.
    pub fn from_queues(queues: i64) -> Self {
        match queues {
            0 => Self::Handoff,
            q if q < 0 => Self::Unbounded,
            q => Self::Bounded(q as usize),
        }
    }
}

/// Builds an [`Executor`] from explicit pool parameters.
pub struct ExecutorBuilder {
    name: String,
    core: usize,
    max: usize,
    keep_alive: Option<Duration>,
    queue: QueueKind,
    eager: bool,
    url: Url,
}

impl ExecutorBuilder {
    /// Starts a builder for `url`, taking the pool name from its
    /// `threadname` parameter.
    pub fn new(url: &Url) -> Self {
        Self {
            name: url.parameter_or(THREAD_NAME_KEY, DEFAULT_THREAD_NAME).to_string(),
            core: 0,
            max: usize::MAX,
            keep_alive: None,
            queue: QueueKind::Handoff,
            eager: false,
            url: url.clone(),
        }
    }

    /// Worker floor: submissions spawn up to this many workers before
    /// queueing, and idle expiry never shrinks below it.
    pub fn core(mut self, core: usize) -> Self {
        self.core = core;
        self
    }

    /// Worker ceiling. `usize::MAX` means unbounded.
    pub fn max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    /// Idle expiry for workers above the core floor; `None` keeps workers
    /// alive forever.
    pub fn keep_alive(mut self, keep_alive: Option<Duration>) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// The work-queue shape.
    pub fn queue(mut self, queue: QueueKind) -> Self {
        self.queue = queue;
        self
    }

    /// Prefer spawning a worker over queueing while below the ceiling.
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// Materializes the pool.
    pub fn build(self) -> Executor {
        let (sender, receiver) = match self.queue {
            QueueKind::Handoff => bounded(0),
            QueueKind::Unbounded => unbounded(),
            QueueKind::Bounded(capacity) => bounded(capacity),
        };
        Executor {
            shared: Arc::new(PoolShared {
                name: self.name,
                core: self.core,
                max: self.max,
                keep_alive: self.keep_alive,
                eager: self.eager,
                sender: Mutex::new(Some(sender)),
                receiver,
                workers: AtomicUsize::new(0),
                largest: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                next_worker_id: AtomicUsize::new(1),
                shutdown: AtomicBool::new(false),
                roster: Mutex::new(Vec::new()),
                url: self.url,
            }),
        }
    }
}

const WORKER_WAITING: u8 = 0;
const WORKER_RUNNING: u8 = 1;

/// One live worker's identity and last-known state. Stable Rust offers no
/// way to capture another OS thread's stack, so the rejection dump renders
/// this roster instead.
struct WorkerSlot {
    name: String,
    status: AtomicU8,
}

impl WorkerSlot {
    fn new(name: String) -> Arc<Self> {
        Arc::new(Self {
            name,
            status: AtomicU8::new(WORKER_WAITING),
        })
    }

    fn set(&self, status: u8) {
        self.status.store(status, Ordering::Relaxed);
    }

    fn describe(&self) -> String {
        let state = match self.status.load(Ordering::Relaxed) {
            WORKER_RUNNING => "running",
            _ => "waiting",
        };
        format!("{}: {}", self.name, state)
    }
}

struct PoolShared {
    name: String,
    core: usize,
    max: usize,
    keep_alive: Option<Duration>,
    eager: bool,
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    workers: AtomicUsize,
    largest: AtomicUsize,
    idle: AtomicUsize,
    active: AtomicUsize,
    next_worker_id: AtomicUsize,
    shutdown: AtomicBool,
    roster: Mutex<Vec<Arc<WorkerSlot>>>,
    url: Url,
}

impl PoolShared {
    /// Reserves a worker slot below `limit`; the caller must spawn or
    /// release it.
    fn grow(&self, limit: usize) -> bool {
        let mut count = self.workers.load(Ordering::Relaxed);
        loop {
            if count >= limit {
                return false;
            }
            match self.workers.compare_exchange(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.largest.fetch_max(count + 1, Ordering::Relaxed);
                    return true;
                }
                Err(actual) => count = actual,
            }
        }
    }

    fn deregister(&self, slot: &Arc<WorkerSlot>) {
        self.roster.lock().retain(|s| !Arc::ptr_eq(s, slot));
    }

    /// Releases a worker slot when above the core floor.
    fn try_shrink(&self) -> bool {
        let mut count = self.workers.load(Ordering::Relaxed);
        loop {
            if count <= self.core {
                return false;
            }
            match self.workers.compare_exchange(
                count,
                count - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => count = actual,
            }
        }
    }
}

/// A handle to one thread pool. Cloning shares the pool.
#[derive(Clone)]
pub struct Executor {
    shared: Arc<PoolShared>,
}

impl Executor {
    /// Submits a task.
    ///
    /// Blocking happens only inside worker hand-off for bounded queues; a
    /// saturated pool rejects immediately through the reporting policy.
    pub fn execute<F>(&self, task: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(task))
    }

    fn submit(&self, job: Job) -> Result<(), ExecutorError> {
        let s = &self.shared;
        if s.shutdown.load(Ordering::Acquire) {
            return Err(ExecutorError::Terminated {
                pool: s.name.clone(),
            });
        }

        // Fill the core before queueing.
        if s.grow(s.core) {
            return self.spawn_worker(Some(job));
        }
        // The eager shape prefers a fresh worker whenever none is idle.
        if s.eager && s.idle.load(Ordering::Relaxed) == 0 && s.grow(s.max) {
            return self.spawn_worker(Some(job));
        }

        let sender = s.sender.lock().clone();
        let Some(sender) = sender else {
            return Err(ExecutorError::Terminated {
                pool: s.name.clone(),
            });
        };
        match sender.try_send(job) {
            Ok(()) => {
                // A queued task needs at least one worker to ever run.
                if s.workers.load(Ordering::Relaxed) == 0 && s.grow(s.max) {
                    self.spawn_worker(None)?;
                }
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(ExecutorError::Terminated {
                pool: s.name.clone(),
            }),
            Err(TrySendError::Full(job)) => {
                if s.grow(s.max) {
                    return self.spawn_worker(Some(job));
                }
                if s.eager {
                    // A worker may have freed between the first offer and
                    // the rejection; offer once more before giving up.
                    if sender.try_send(job).is_ok() {
                        return Ok(());
                    }
                }
                self.reject()
            }
        }
    }

    fn spawn_worker(&self, first: Option<Job>) -> Result<(), ExecutorError> {
        let shared = Arc::clone(&self.shared);
        let id = shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-thread-{}", shared.name, id);
        let slot = WorkerSlot::new(name.clone());
        shared.roster.lock().push(Arc::clone(&slot));
        let spawned = {
            let shared = Arc::clone(&shared);
            let slot = Arc::clone(&slot);
            thread::Builder::new()
                .name(name)
                .spawn(move || worker_loop(shared, slot, first))
        };
        match spawned {
            Ok(_) => Ok(()),
            Err(e) => {
                self.shared.workers.fetch_sub(1, Ordering::AcqRel);
                self.shared.deregister(&slot);
                error!(pool = %self.shared.name, error = %e, "Failed to spawn worker thread");
                Err(ExecutorError::Spawn(e.to_string()))
            }
        }
    }

    fn reject(&self) -> Result<(), ExecutorError> {
        let message = reject::report(&self.snapshot(), &self.shared.url);
        Err(ExecutorError::Rejected { message })
    }

    /// A point-in-time view of the pool, used by the rejection policy.
    pub fn snapshot(&self) -> reject::PoolSnapshot {
        let s = &self.shared;
        reject::PoolSnapshot {
            name: s.name.clone(),
            pool_size: s.workers.load(Ordering::Relaxed),
            active: s.active.load(Ordering::Relaxed),
            core: s.core,
            max: s.max,
            largest: s.largest.load(Ordering::Relaxed),
            queue_len: s.receiver.len(),
            workers: s.roster.lock().iter().map(|slot| slot.describe()).collect(),
            url: s.url.to_string(),
        }
    }

    /// Current worker count.
    pub fn pool_size(&self) -> usize {
        self.shared.workers.load(Ordering::Relaxed)
    }

    /// Tasks currently running.
    pub fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::Relaxed)
    }

    /// Tasks waiting in the queue.
    pub fn queue_size(&self) -> usize {
        self.shared.receiver.len()
    }

    /// The pool name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the pool has been shut down.
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Stops accepting tasks. Queued tasks still drain; idle workers exit
    /// once the queue is empty.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.sender.lock().take();
        debug!(pool = %self.shared.name, "Executor shut down");
    }
}

fn worker_loop(shared: Arc<PoolShared>, slot: Arc<WorkerSlot>, first: Option<Job>) {
    if let Some(job) = first {
        slot.set(WORKER_RUNNING);
        run_job(&shared, job);
        slot.set(WORKER_WAITING);
    }
    loop {
        shared.idle.fetch_add(1, Ordering::Relaxed);
        let next = match shared.keep_alive {
            Some(timeout) => shared.receiver.recv_timeout(timeout),
            None => shared
                .receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };
        shared.idle.fetch_sub(1, Ordering::Relaxed);

        match next {
            Ok(job) => {
                slot.set(WORKER_RUNNING);
                run_job(&shared, job);
                slot.set(WORKER_WAITING);
            }
            Err(RecvTimeoutError::Timeout) => {
                if shared.try_shrink() {
                    shared.deregister(&slot);
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                shared.workers.fetch_sub(1, Ordering::AcqRel);
                shared.deregister(&slot);
                return;
            }
        }
    }
}

fn run_job(shared: &PoolShared, job: Job) {
    shared.active.fetch_add(1, Ordering::Relaxed);
    let outcome = catch_unwind(AssertUnwindSafe(job));
    shared.active.fetch_sub(1, Ordering::Relaxed);
    if outcome.is_err() {
        error!(pool = %shared.name, "Task panicked in worker thread");
    }
}
