//! Bounded cache with least-recently-used eviction.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use trellis_core::constants::{CACHE_SIZE_KEY, DEFAULT_CACHE_SIZE};
use trellis_core::{Invocation, Url};
use trellis_extension::{extension_class, Extension};

use crate::factory::{Cache, CacheError, CacheFactory};

struct LruEntry {
    value: Value,
    /// Access stamp; smallest is the eviction victim.
    last_accessed: u64,
}

struct LruState {
    entries: HashMap<String, LruEntry>,
    tick: u64,
    capacity: usize,
}

impl LruState {
    fn stamp(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_least_recent(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

/// A bounded store evicting the least recently accessed entry when full.
pub struct LruCache {
    state: Mutex<LruState>,
}

impl LruCache {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState {
                entries: HashMap::new(),
                tick: 0,
                capacity: capacity.max(1),
            }),
        }
    }
}

impl Cache for LruCache {
    fn put(&self, key: String, value: Value) {
        let mut state = self.state.lock();
        let stamp = state.stamp();
        if !state.entries.contains_key(&key) && state.entries.len() >= state.capacity {
            state.evict_least_recent();
        }
        state.entries.insert(
            key,
            LruEntry {
                value,
                last_accessed: stamp,
            },
        );
    }

    fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.state.lock();
        let stamp = state.stamp();
        let entry = state.entries.get_mut(key)?;
        entry.last_accessed = stamp;
        Some(entry.value.clone())
    }
}

/// Builds one [`LruCache`] per service URL, sized by `cache.size`.
#[derive(Default)]
pub struct LruCacheFactory {
    caches: Mutex<HashMap<String, Arc<dyn Cache>>>,
}

impl Extension for LruCacheFactory {}

impl CacheFactory for LruCacheFactory {
    fn cache(&self, url: &Url, _invocation: &dyn Invocation) -> Result<Arc<dyn Cache>, CacheError> {
        let capacity =
            url.positive_parameter(CACHE_SIZE_KEY, DEFAULT_CACHE_SIZE as u64) as usize;
        Ok(Arc::clone(
            self.caches
                .lock()
                .entry(url.identity())
                .or_insert_with(|| Arc::new(LruCache::new(capacity))),
        ))
    }
}

extension_class!(
    LRU_CACHE_FACTORY,
    dyn CacheFactory,
    "trellis_cache::lru::LruCacheFactory",
    normal = |_inj| Ok(Box::new(LruCacheFactory::default())),
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::RpcInvocation;

    #[test]
    fn evicts_least_recently_used() {
        let cache = LruCache::new(2);
        cache.put("a".into(), json!(1));
        cache.put("b".into(), json!(2));
        // Touch `a` so `b` is now the oldest.
        assert_eq!(cache.get("a"), Some(json!(1)));
        cache.put("c".into(), json!(3));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(json!(1)));
        assert_eq!(cache.get("c"), Some(json!(3)));
    }

    #[test]
    fn replacing_a_key_keeps_capacity() {
        let cache = LruCache::new(2);
        cache.put("a".into(), json!(1));
        cache.put("a".into(), json!(2));
        cache.put("b".into(), json!(3));
        assert_eq!(cache.get("a"), Some(json!(2)));
        assert_eq!(cache.get("b"), Some(json!(3)));
    }

    #[test]
    fn factory_memoizes_per_url() {
        let factory = LruCacheFactory::default();
        let url: Url = "trpc://h:1/svc?cache.size=4".parse().unwrap();
        let other: Url = "trpc://h:2/svc?cache.size=4".parse().unwrap();
        let inv = RpcInvocation::new("find");

        let first = factory.cache(&url, &inv).unwrap();
        first.put("k".into(), json!("v"));
        let again = factory.cache(&url, &inv).unwrap();
        assert_eq!(again.get("k"), Some(json!("v")));

        let separate = factory.cache(&other, &inv).unwrap();
        assert_eq!(separate.get("k"), None);
    }
}
