//! Memoized (node code, normalized query) → winning-child decisions (§4.E).

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use refnorm_models::ClassifierCacheEntry;

const DEFAULT_CAPACITY: usize = 4096;

type CacheKey = (String, String);

pub struct ClassifierCache {
    inner: Mutex<LruCache<CacheKey, ClassifierCacheEntry>>,
}

impl ClassifierCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self { inner: Mutex::new(LruCache::new(cap)) }
    }

    pub fn get(&self, node_code: &str, normalized_query: &str) -> Option<ClassifierCacheEntry> {
        let mut cache = self.inner.lock();
        cache.get(&(node_code.to_string(), normalized_query.to_string())).cloned()
    }

    pub fn put(&self, node_code: &str, normalized_query: &str, entry: ClassifierCacheEntry) {
        let mut cache = self.inner.lock();
        cache.put((node_code.to_string(), normalized_query.to_string()), entry);
    }
}

impl Default for ClassifierCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_retrieves_entries() {
        let cache = ClassifierCache::new();
        assert!(cache.get("root", "winter tire").is_none());
        cache.put("root", "winter tire", ClassifierCacheEntry { winning_child_code: "01".into(), confidence: 0.9 });
        let entry = cache.get("root", "winter tire").unwrap();
        assert_eq!(entry.winning_child_code, "01");
    }

    #[test]
    fn evicts_least_recently_used_past_capacity() {
        let cache = ClassifierCache::with_capacity(1);
        cache.put("root", "a", ClassifierCacheEntry { winning_child_code: "01".into(), confidence: 1.0 });
        cache.put("root", "b", ClassifierCacheEntry { winning_child_code: "02".into(), confidence: 1.0 });
        assert!(cache.get("root", "a").is_none());
        assert!(cache.get("root", "b").is_some());
    }
}
