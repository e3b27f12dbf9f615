//! Cache with per-entry time-to-live.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use trellis_core::constants::{
    CACHE_SECONDS_KEY, CACHE_SIZE_KEY, DEFAULT_CACHE_SECONDS, DEFAULT_CACHE_SIZE,
};
use trellis_core::{Invocation, Url};
use trellis_extension::{extension_class, Extension};

use crate::factory::{Cache, CacheError, CacheFactory};

struct ExpiringEntry {
    value: Value,
    expires_at: Instant,
}

/// A bounded store whose entries expire a fixed duration after insertion.
///
/// Every insert sweeps expired entries first; a full store then evicts the
/// entry closest to expiry. Reads drop expired entries on access. No
/// sweeper thread runs, so memory is bounded by `capacity` live entries.
pub struct ExpiringCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, ExpiringEntry>>,
}

impl ExpiringCache {
    /// Creates a cache whose entries live for `ttl`, holding at most
    /// `capacity` of them.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Live entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_closest_to_expiry(entries: &mut HashMap<String, ExpiringEntry>) {
        let victim = entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            entries.remove(&key);
        }
    }
}

impl Cache for ExpiringCache {
    fn put(&self, key: String, value: Value) {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, entry| now < entry.expires_at);
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            Self::evict_closest_to_expiry(&mut entries);
        }
        entries.insert(
            key,
            ExpiringEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

/// Builds one [`ExpiringCache`] per service URL, with the time-to-live from
/// `cache.seconds` and the bound from `cache.size`.
#[derive(Default)]
pub struct ExpiringCacheFactory {
    caches: Mutex<HashMap<String, Arc<dyn Cache>>>,
}

impl Extension for ExpiringCacheFactory {}

impl CacheFactory for ExpiringCacheFactory {
    fn cache(&self, url: &Url, _invocation: &dyn Invocation) -> Result<Arc<dyn Cache>, CacheError> {
        let ttl = Duration::from_secs(url.positive_parameter(
            CACHE_SECONDS_KEY,
            DEFAULT_CACHE_SECONDS,
        ));
        let capacity =
            url.positive_parameter(CACHE_SIZE_KEY, DEFAULT_CACHE_SIZE as u64) as usize;
        Ok(Arc::clone(
            self.caches
                .lock()
                .entry(url.identity())
                .or_insert_with(|| Arc::new(ExpiringCache::new(ttl, capacity))),
        ))
    }
}

extension_class!(
    EXPIRING_CACHE_FACTORY,
    dyn CacheFactory,
    "trellis_cache::expiring::ExpiringCacheFactory",
    normal = |_inj| Ok(Box::new(ExpiringCacheFactory::default())),
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_survive_within_ttl() {
        let cache = ExpiringCache::new(Duration::from_secs(60), 16);
        cache.put("k".into(), json!(1));
        assert_eq!(cache.get("k"), Some(json!(1)));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = ExpiringCache::new(Duration::from_millis(20), 16);
        cache.put("k".into(), json!(1));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn inserts_sweep_expired_entries_out() {
        let cache = ExpiringCache::new(Duration::from_millis(20), 16);
        cache.put("stale".into(), json!(1));
        std::thread::sleep(Duration::from_millis(60));
        // The stale entry is gone after the insert-time sweep, even though
        // it was never read back.
        cache.put("fresh".into(), json!(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh"), Some(json!(2)));
    }

    #[test]
    fn full_store_evicts_the_entry_closest_to_expiry() {
        let cache = ExpiringCache::new(Duration::from_secs(60), 2);
        cache.put("a".into(), json!(1));
        std::thread::sleep(Duration::from_millis(5));
        cache.put("b".into(), json!(2));
        std::thread::sleep(Duration::from_millis(5));
        cache.put("c".into(), json!(3));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(json!(2)));
        assert_eq!(cache.get("c"), Some(json!(3)));
    }
}
