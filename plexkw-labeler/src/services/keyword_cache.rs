//! Bounded cache of extracted IMDb keywords
//!
//! Lives for the process lifetime with no explicit invalidation; LRU eviction
//! keeps it bounded. Per process and best-effort, like the rate window.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Default number of cached titles
pub const DEFAULT_CAPACITY: usize = 1000;

/// Keyword lists keyed by IMDb id
pub trait KeywordCache: Send + Sync {
    fn get(&self, imdb_id: &str) -> Option<Vec<String>>;
    fn put(&self, imdb_id: &str, keywords: Vec<String>);
}

/// In-process LRU keyword cache
pub struct LruKeywordCache {
    entries: Mutex<LruCache<String, Vec<String>>>,
}

impl LruKeywordCache {
    /// A capacity of zero is bumped to one
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LruKeywordCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl KeywordCache for LruKeywordCache {
    fn get(&self, imdb_id: &str) -> Option<Vec<String>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(imdb_id)
            .cloned()
    }

    fn put(&self, imdb_id: &str, keywords: Vec<String>) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(imdb_id.to_string(), keywords);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_after_put() {
        let cache = LruKeywordCache::new(4);
        assert!(cache.get("tt0111161").is_none());

        cache.put("tt0111161", vec!["prison".to_string()]);
        assert_eq!(cache.get("tt0111161"), Some(vec!["prison".to_string()]));
    }

    #[test]
    fn test_bounded_eviction() {
        let cache = LruKeywordCache::new(2);
        cache.put("tt0000001", vec!["a".to_string()]);
        cache.put("tt0000002", vec!["b".to_string()]);
        cache.put("tt0000003", vec!["c".to_string()]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("tt0000001").is_none());
        assert!(cache.get("tt0000003").is_some());
    }
}
