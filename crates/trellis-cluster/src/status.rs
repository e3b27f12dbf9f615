//! Concurrency statistics per endpoint method.
//!
//! The least-active balancer reads these counters; the invocation pipeline
//! brackets each call with [`CallStatus::begin`] so the active count tracks
//! in-flight requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use trellis_core::Url;

fn table() -> &'static RwLock<HashMap<String, Arc<CallStatus>>> {
    static TABLE: OnceLock<RwLock<HashMap<String, Arc<CallStatus>>>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(HashMap::new()))
}

fn key(url: &Url, method: &str) -> String {
    format!("{}/{}#{}", url.address(), url.path(), method)
}

/// Per-`(endpoint, method)` call statistics.
#[derive(Default)]
pub struct CallStatus {
    active: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl CallStatus {
    /// The status cell for an endpoint method, created on first use.
    pub fn of(url: &Url, method: &str) -> Arc<CallStatus> {
        let k = key(url, method);
        if let Some(status) = table().read().get(&k) {
            return Arc::clone(status);
        }
        Arc::clone(table().write().entry(k).or_default())
    }

    /// The current active-call count, zero when never tracked.
    pub fn active_count(url: &Url, method: &str) -> u64 {
        table()
            .read()
            .get(&key(url, method))
            .map(|s| s.active())
            .unwrap_or(0)
    }

    /// Marks a call started; the guard ends it on drop.
    pub fn begin(url: &Url, method: &str) -> CallGuard {
        let status = Self::of(url, method);
        status.active.fetch_add(1, Ordering::Relaxed);
        CallGuard {
            status,
            failed: false,
        }
    }

    /// In-flight calls.
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Completed successful calls.
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Completed failed calls.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// RAII bracket around one tracked call.
pub struct CallGuard {
    status: Arc<CallStatus>,
    failed: bool,
}

impl CallGuard {
    /// Records the call as failed when the guard drops.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.status.active.fetch_sub(1, Ordering::Relaxed);
        if self.failed {
            self.status.failed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.status.succeeded.fetch_add(1, Ordering::Relaxed);
        }
    }
}
