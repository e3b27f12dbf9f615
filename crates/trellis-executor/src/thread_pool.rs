//! The thread-pool extension point and its four built-in shapes.

use std::time::Duration;

use thiserror::Error;

use trellis_core::constants::{
    ALIVE_KEY, CORE_THREADS_KEY, DEFAULT_ALIVE, DEFAULT_QUEUES, DEFAULT_THREADS, QUEUES_KEY,
    THREADS_KEY,
};
use trellis_core::Url;
use trellis_extension::{
    descriptor_resource, extension_class, extension_point, Extension, ExtensionError,
};

use crate::pool::{Executor, ExecutorBuilder, QueueKind};

/// Errors raised by executor construction and task submission.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The pool rejected a task; the diagnostics dump was already written.
    #[error("task rejected: {message}")]
    Rejected {
        /// The rendered pool snapshot.
        message: String,
    },

    /// The pool is shut down.
    #[error("executor `{pool}` is shut down")]
    Terminated {
        /// Pool name.
        pool: String,
    },

    /// The OS refused a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    /// Pool-shape resolution through the registry failed.
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

/// A policy that materializes a work executor from URL parameters.
///
/// Selected per service URL through the `threadpool` key; every shape reads
/// `threadname`, `threads`, and `queues`, the expiring shapes also `alive`
/// and `corethreads`.
#[extension_point(default = "fixed")]
pub trait ThreadPool: Extension {
    /// Builds this shape's executor for `url`.
    #[adaptive("threadpool")]
    fn executor(&self, url: &Url) -> Result<Executor, ExecutorError>;
}

fn threads(url: &Url) -> usize {
    url.positive_parameter(THREADS_KEY, DEFAULT_THREADS as u64) as usize
}

fn core_threads(url: &Url) -> usize {
    url.typed_parameter::<u64>(CORE_THREADS_KEY).unwrap_or(0) as usize
}

fn queues(url: &Url) -> i64 {
    url.typed_parameter::<i64>(QUEUES_KEY).unwrap_or(DEFAULT_QUEUES)
}

fn keep_alive(url: &Url) -> Duration {
    Duration::from_millis(url.positive_parameter(ALIVE_KEY, DEFAULT_ALIVE))
}

/// `threads` workers, pre-grown on demand up to the fixed size, never
/// expiring.
#[derive(Default)]
pub struct FixedThreadPool;

impl Extension for FixedThreadPool {}

impl ThreadPool for FixedThreadPool {
    fn executor(&self, url: &Url) -> Result<Executor, ExecutorError> {
        let threads = threads(url);
        Ok(ExecutorBuilder::new(url)
            .core(threads)
            .max(threads)
            .keep_alive(None)
            .queue(QueueKind::from_queues(queues(url)))
            .build())
    }
}

/// No worker floor, unbounded ceiling, one-minute idle expiry.
#[derive(Default)]
pub struct CachedThreadPool;

impl Extension for CachedThreadPool {}

impl ThreadPool for CachedThreadPool {
    fn executor(&self, url: &Url) -> Result<Executor, ExecutorError> {
        Ok(ExecutorBuilder::new(url)
            .core(core_threads(url))
            .max(usize::MAX)
            .keep_alive(Some(keep_alive(url)))
            .queue(QueueKind::from_queues(queues(url)))
            .build())
    }
}

/// Grows on demand up to `threads` and never shrinks.
#[derive(Default)]
pub struct LimitedThreadPool;

impl Extension for LimitedThreadPool {}

impl ThreadPool for LimitedThreadPool {
    fn executor(&self, url: &Url) -> Result<Executor, ExecutorError> {
        Ok(ExecutorBuilder::new(url)
            .core(core_threads(url))
            .max(threads(url))
            .keep_alive(None)
            .queue(QueueKind::from_queues(queues(url)))
            .build())
    }
}

/// Prefers creating a worker over queueing until the ceiling; its bounded
/// queue re-offers a task once before rejecting.
#[derive(Default)]
pub struct EagerThreadPool;

impl Extension for EagerThreadPool {}

impl ThreadPool for EagerThreadPool {
    fn executor(&self, url: &Url) -> Result<Executor, ExecutorError> {
        let capacity = queues(url).max(1) as usize;
        Ok(ExecutorBuilder::new(url)
            .core(core_threads(url))
            .max(threads(url))
            .keep_alive(Some(keep_alive(url)))
            .queue(QueueKind::Bounded(capacity))
            .eager(true)
            .build())
    }
}

extension_class!(
    FIXED_THREAD_POOL,
    dyn ThreadPool,
    "trellis_executor::thread_pool::FixedThreadPool",
    normal = |_inj| Ok(Box::new(FixedThreadPool)),
);

extension_class!(
    CACHED_THREAD_POOL,
    dyn ThreadPool,
    "trellis_executor::thread_pool::CachedThreadPool",
    normal = |_inj| Ok(Box::new(CachedThreadPool)),
);

extension_class!(
    LIMITED_THREAD_POOL,
    dyn ThreadPool,
    "trellis_executor::thread_pool::LimitedThreadPool",
    normal = |_inj| Ok(Box::new(LimitedThreadPool)),
);

extension_class!(
    EAGER_THREAD_POOL,
    dyn ThreadPool,
    "trellis_executor::thread_pool::EagerThreadPool",
    normal = |_inj| Ok(Box::new(EagerThreadPool)),
);

descriptor_resource!(
    THREAD_POOL_DESCRIPTOR,
    directory = "META-INF/trellis/internal/",
    basename = "trellis_executor.thread_pool.ThreadPool",
    contents = include_str!(
        "../resources/META-INF/trellis/internal/trellis_executor.thread_pool.ThreadPool"
    ),
);
