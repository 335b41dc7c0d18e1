//! In-memory TTL cache shared by search, research and the orchestrator.
//!
//! Each component owns its own instance. Entries past their TTL are never
//! returned; when the cache is full the least recently used entry is evicted.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Stamped<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> Stamped<V> {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= ttl
    }
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded, TTL-aware, LRU-evicting cache.
///
/// `None` inside means caching is disabled (zero TTL or zero capacity).
pub struct TtlCache<K: Hash + Eq, V> {
    entries: Option<Mutex<LruCache<K, Stamped<V>>>>,
    ttl: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Hash + Eq, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("entries", &self.entries.as_ref().map_or(0, |e| e.lock().len()))
            .finish()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// A zero TTL or zero capacity disables caching.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let entries = NonZeroUsize::new(capacity)
            .filter(|_| !ttl.is_zero())
            .map(|cap| Mutex::new(LruCache::new(cap)));
        Self {
            entries,
            ttl,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry, refreshing its recency.
    pub fn get(&self, key: &K) -> Option<V> {
        let hit = self.entries.as_ref().and_then(|entries| {
            let mut entries = entries.lock();
            let now = Instant::now();
            let live = entries
                .get(key)
                .map(|entry| (!entry.is_expired(self.ttl, now)).then(|| entry.value.clone()));
            match live {
                Some(Some(value)) => Some(value),
                Some(None) => {
                    entries.pop(key);
                    None
                }
                None => None,
            }
        });

        match hit {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        hit
    }

    /// Insert or replace; a full cache drops its least recently used entry.
    pub fn insert(&self, key: K, value: V) {
        if let Some(entries) = &self.entries {
            entries.lock().put(
                key,
                Stamped {
                    value,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries
            .as_ref()
            .and_then(|entries| entries.lock().pop(key))
            .map(|e| e.value)
    }

    /// Liveness check that does not touch recency.
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.entries.as_ref().is_some_and(|entries| {
            entries
                .lock()
                .peek(key)
                .is_some_and(|e| !e.is_expired(self.ttl, now))
        })
    }

    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock().clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss_counters() {
        let cache = TtlCache::new(Duration::from_secs(60), 4);
        assert_eq!(cache.get(&"a"), None);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_expired_entries_are_never_hits() {
        let cache = TtlCache::new(Duration::from_millis(20), 4);
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(40));
        assert!(!cache.contains(&"a"));
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);

        // Touch "a" so "b" becomes the LRU entry
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3);

        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_contains_does_not_refresh_recency() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert!(cache.contains(&"a"));
        cache.insert("c", 3);
        assert!(!cache.contains(&"a"));
    }

    #[test]
    fn test_reinsert_does_not_evict() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn test_zero_ttl_or_capacity_disables_cache() {
        let cache = TtlCache::new(Duration::ZERO, 8);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());

        let cache = TtlCache::new(Duration::from_secs(60), 0);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.stats().misses, 1);
    }
}
