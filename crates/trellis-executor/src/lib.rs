//! # Trellis Executor
//!
//! URL-configured thread pools for server-side request handling.
//!
//! [`ThreadPool`] is an extension point selected by the `threadpool` URL key.
//! Four shapes ship built in, all sharing one worker/queue engine and the
//! reporting rejection policy:
//!
//! | name | workers | queue |
//! |------|---------|-------|
//! | `fixed` (default) | `threads` pre-grown, never expire | by `queues` |
//! | `cached` | grown on demand, 60 s idle expiry | by `queues` |
//! | `limited` | grown on demand up to `threads`, never shrink | by `queues` |
//! | `eager` | prefers a new worker over queueing, 60 s expiry | bounded, retried offer |
//!
//! `queues == 0` selects a hand-off queue (a task is accepted only when a
//! worker is already waiting), negative values an unbounded FIFO, positive
//! values a FIFO bounded at that capacity.
//!
//! On rejection the policy logs an actionable warning, writes a diagnostics
//! dump file named `{threadname}_TStack_{millis}` (at most once per ten
//! minutes per pool) with the pool snapshot, the worker roster, and the
//! rejecting thread's stack, and returns [`ExecutorError::Rejected`] to the
//! caller.

mod pool;
mod reject;
mod thread_pool;

pub use pool::{Executor, ExecutorBuilder, QueueKind};
pub use reject::{set_dump_directory, PoolSnapshot};
pub use thread_pool::{
    CachedThreadPool, EagerThreadPool, ExecutorError, FixedThreadPool, LimitedThreadPool,
    ThreadPool,
};
