//! Well-known URL parameter keys and their defaults.

/// Sentinel name resolving to an extension point's declared default.
pub const DEFAULT_KEY: &str = "default";

/// Prefix marking a name for removal in activation requests.
pub const REMOVE_VALUE_PREFIX: &str = "-";

/// Reserved alias for the default extension name.
pub const TRUE_VALUE: &str = "true";

/// Separator for multi-valued parameters (`filter=a,b,c`).
pub const COMMA_SEPARATOR: char = ',';

/// Endpoint weight parameter.
pub const WEIGHT_KEY: &str = "weight";

/// Default endpoint weight.
pub const DEFAULT_WEIGHT: u64 = 100;

/// Endpoint start timestamp parameter (milliseconds since the epoch).
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Warm-up window parameter (milliseconds).
pub const WARMUP_KEY: &str = "warmup";

/// Default warm-up window: ten minutes.
pub const DEFAULT_WARMUP: u64 = 10 * 60 * 1000;

/// Load balancer selection key.
pub const LOADBALANCE_KEY: &str = "loadbalance";

/// Thread pool selection key.
pub const THREADPOOL_KEY: &str = "threadpool";

/// Worker thread name prefix parameter.
pub const THREAD_NAME_KEY: &str = "threadname";

/// Default worker thread name prefix.
pub const DEFAULT_THREAD_NAME: &str = "Trellis";

/// Maximum worker count parameter.
pub const THREADS_KEY: &str = "threads";

/// Default maximum worker count.
pub const DEFAULT_THREADS: usize = 200;

/// Core (pre-spawned floor) worker count parameter.
pub const CORE_THREADS_KEY: &str = "corethreads";

/// Work queue capacity parameter. Zero selects a hand-off queue, a negative
/// value an unbounded FIFO, a positive value a bounded FIFO.
pub const QUEUES_KEY: &str = "queues";

/// Default work queue capacity.
pub const DEFAULT_QUEUES: i64 = 0;

/// Idle worker keep-alive parameter (milliseconds).
pub const ALIVE_KEY: &str = "alive";

/// Default idle worker keep-alive: one minute.
pub const DEFAULT_ALIVE: u64 = 60_000;

/// Directory for thread-pool rejection dump files.
pub const DUMP_DIRECTORY_KEY: &str = "dump.directory";

/// Cache backend selection key.
pub const CACHE_KEY: &str = "cache";

/// Cache capacity parameter.
pub const CACHE_SIZE_KEY: &str = "cache.size";

/// Default cache capacity.
pub const DEFAULT_CACHE_SIZE: usize = 1000;

/// Cache entry time-to-live parameter (seconds).
pub const CACHE_SECONDS_KEY: &str = "cache.seconds";

/// Default cache entry time-to-live.
pub const DEFAULT_CACHE_SECONDS: u64 = 180;
