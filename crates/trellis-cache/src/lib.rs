//! # Trellis Cache
//!
//! The result-cache contract consumed by the invocation pipeline.
//!
//! [`CacheFactory`] is an extension point selected per call by the `cache`
//! URL key; factories memoize one [`Cache`] per service URL. Two simple
//! backends ship built in: `lru` (bounded, recency eviction, the default)
//! and `expiring` (per-entry time-to-live, swept on insert, bounded).

mod expiring;
mod factory;
mod lru;

pub use expiring::{ExpiringCache, ExpiringCacheFactory};
pub use factory::{Cache, CacheError, CacheFactory};
pub use lru::{LruCache, LruCacheFactory};
