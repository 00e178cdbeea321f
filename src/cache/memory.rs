//! In-process concurrent cache backend.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::{CacheBackend, CacheEntry, CacheKey, CacheStats};

/// Cache backed by a concurrent hash map, shared between worker threads.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<CacheKey, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for InMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(*entry.value())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, key: CacheKey, entry: CacheEntry) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key, entry);
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_and_stats() {
        let cache = InMemoryCache::new();
        let key = CacheKey::builder(b"f").indices(&[0]).finish();
        assert!(cache.get(&key).is_none());
        cache.set(key, CacheEntry::single(1.5));
        assert_eq!(cache.get(&key).unwrap().value, 1.5);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                sets: 1
            }
        );
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
