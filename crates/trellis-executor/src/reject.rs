//! The reporting rejection policy.
//!
//! A rejected submission produces three things: an actionable warning log,
//! a diagnostics dump file (throttled to one per ten minutes per pool), and
//! a `Rejected` error back to the caller. The dump carries the pool
//! snapshot, every worker's last-known state, and the rejecting thread's
//! stack.

use std::backtrace::Backtrace;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use trellis_core::constants::DUMP_DIRECTORY_KEY;
use trellis_core::Url;

/// Minimum spacing between two dump files.
const DUMP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// A point-in-time view of a pool, rendered into logs and dump files.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    /// Pool name (the `threadname` parameter).
    pub name: String,
    /// Current worker count.
    pub pool_size: usize,
    /// Tasks currently running.
    pub active: usize,
    /// Worker floor.
    pub core: usize,
    /// Worker ceiling; `usize::MAX` renders as `unbounded`.
    pub max: usize,
    /// Largest worker count ever reached.
    pub largest: usize,
    /// Tasks waiting in the queue.
    pub queue_len: usize,
    /// Each live worker's identity and last-known state.
    pub workers: Vec<String>,
    /// The pool's configuration URL.
    pub url: String,
}

impl fmt::Display for PoolSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max: &dyn fmt::Display = if self.max == usize::MAX {
            &"unbounded"
        } else {
            &self.max
        };
        write!(
            f,
            "Thread pool is exhausted! Pool: {}, size {} (active {}, core {}, max {}, \
             largest {}), queue {}, in {}",
            self.name, self.pool_size, self.active, self.core, max, self.largest,
            self.queue_len, self.url
        )
    }
}

fn dump_override() -> &'static RwLock<Option<PathBuf>> {
    static DIR: OnceLock<RwLock<Option<PathBuf>>> = OnceLock::new();
    DIR.get_or_init(|| RwLock::new(None))
}

/// Sets the process-wide fallback directory for rejection dump files. URLs
/// carrying a `dump.directory` parameter still win.
pub fn set_dump_directory(path: PathBuf) {
    *dump_override().write() = Some(path);
}

fn dump_directory(url: &Url) -> PathBuf {
    if let Some(dir) = url.parameter(DUMP_DIRECTORY_KEY) {
        return PathBuf::from(dir);
    }
    dump_override()
        .read()
        .clone()
        .unwrap_or_else(std::env::temp_dir)
}

/// Logs the rejection, writes the throttled dump file, and returns the
/// message handed back to the caller.
pub(crate) fn report(snapshot: &PoolSnapshot, url: &Url) -> String {
    let message = snapshot.to_string();
    warn!(
        pool = %snapshot.name,
        pool_size = snapshot.pool_size,
        active = snapshot.active,
        queue = snapshot.queue_len,
        "{message}"
    );
    dump(snapshot, dump_directory(url));
    message
}

/// Writes the diagnostics dump, at most once per [`DUMP_INTERVAL`] per pool.
fn dump(snapshot: &PoolSnapshot, directory: PathBuf) {
    static LAST_DUMP: OnceLock<Mutex<std::collections::HashMap<String, Instant>>> =
        OnceLock::new();
    {
        let mut last = LAST_DUMP
            .get_or_init(|| Mutex::new(std::collections::HashMap::new()))
            .lock();
        if last
            .get(&snapshot.name)
            .is_some_and(|at| at.elapsed() < DUMP_INTERVAL)
        {
            return;
        }
        last.insert(snapshot.name.clone(), Instant::now());
    }

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let path = directory.join(format!("{}_TStack_{}", snapshot.name, millis));

    let written = fs::File::create(&path).and_then(|mut file| {
        writeln!(file, "{snapshot}")?;
        writeln!(file)?;
        // Other threads' stacks cannot be captured from stable Rust; the
        // roster records what every worker was last doing instead.
        writeln!(file, "Workers ({}):", snapshot.workers.len())?;
        for worker in &snapshot.workers {
            writeln!(file, "  {worker}")?;
        }
        writeln!(file)?;
        writeln!(file, "Stack of the rejecting thread:")?;
        writeln!(file, "{}", Backtrace::force_capture())
    });
    match written {
        Ok(()) => warn!(path = %path.display(), "Wrote thread-pool rejection dump"),
        Err(e) => warn!(
            path = %path.display(),
            error = %e,
            "Failed to write thread-pool rejection dump"
        ),
    }
}
