//! # Result Cache
//!
//! Tagged, schema-versioned, TTL-bound LRU store. Every operation runs under
//! one mutex, so LRU bookkeeping is never raced and eviction is complete by
//! the time `set` returns.

use super::stats::{CacheStats, Counters};
use crate::config::CacheConfig;
use crate::constants::tags::WILDCARD;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Shortest lifetime an entry can be given
const MIN_TTL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub tags: BTreeSet<String>,
    pub created_at: Instant,
    /// Always later than `created_at`
    pub expires_at: Instant,
    pub schema_version: u32,
}

impl<T> CacheEntry<T> {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct CacheInner<T> {
    entries: LruCache<String, CacheEntry<T>>,
    max_entries: usize,
    default_ttl: Duration,
    schema_version: u32,
    counters: Counters,
}

impl<T> CacheInner<T> {
    fn evict_overflow(&mut self) {
        while self.entries.len() > self.max_entries {
            match self.entries.pop_lru() {
                Some((key, _)) => {
                    self.counters.evictions += 1;
                    crate::log_cache!(debug, "evict_lru", key = %key, "Evicted least recently used entry");
                }
                None => break,
            }
        }
    }
}

enum Lookup<T> {
    Missing,
    Expired,
    StaleSchema,
    Fresh(T),
}

#[derive(Debug)]
pub struct ResultCache<T> {
    inner: Mutex<CacheInner<T>>,
}

impl<T: Clone> ResultCache<T> {
    pub fn new(max_entries: usize, default_ttl: Duration, schema_version: u32) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                max_entries: max_entries.max(1),
                default_ttl: default_ttl.max(MIN_TTL),
                schema_version,
                counters: Counters::default(),
            }),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl(), config.schema_version)
    }

    /// Look up a live entry, promoting it to most recently used.
    ///
    /// Expired entries are removed on read and counted as an eviction and a
    /// miss; entries from another schema version are removed and counted as a
    /// miss.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let version = inner.schema_version;

        let lookup = match inner.entries.get(key) {
            None => Lookup::Missing,
            Some(entry) if entry.schema_version != version => Lookup::StaleSchema,
            Some(entry) if entry.is_expired_at(now) => Lookup::Expired,
            Some(entry) => Lookup::Fresh(entry.value.clone()),
        };

        match lookup {
            Lookup::Fresh(value) => {
                inner.counters.hits += 1;
                trace!(key = %key, "Cache hit");
                Some(value)
            }
            Lookup::Missing => {
                inner.counters.misses += 1;
                None
            }
            Lookup::Expired => {
                inner.entries.pop(key);
                inner.counters.misses += 1;
                inner.counters.evictions += 1;
                inner.counters.expirations += 1;
                crate::log_cache!(debug, "expire", key = %key, "Expired entry evicted on read");
                None
            }
            Lookup::StaleSchema => {
                inner.entries.pop(key);
                inner.counters.misses += 1;
                debug!(key = %key, "Dropped entry written under a different schema version");
                None
            }
        }
    }

    /// Whether a live entry exists, without touching recency or statistics
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .entries
            .peek(key)
            .is_some_and(|e| e.schema_version == inner.schema_version && !e.is_expired_at(now))
    }

    /// Insert or replace an entry, evicting least recently used entries
    /// until the cache is back within capacity.
    pub fn set(&self, key: &str, value: T, tags: BTreeSet<String>, ttl_override: Option<Duration>) {
        let mut inner = self.inner.lock();
        let created_at = Instant::now();
        let ttl = ttl_override.unwrap_or(inner.default_ttl).max(MIN_TTL);
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            tags,
            created_at,
            expires_at: created_at + ttl,
            schema_version: inner.schema_version,
        };

        let replaced = inner.entries.put(key.to_string(), entry).is_some();
        inner.counters.sets += 1;
        inner.evict_overflow();

        crate::log_cache!(
            debug,
            "set",
            key = %key,
            replaced = replaced,
            ttl_ms = ttl.as_millis() as u64,
            size = inner.entries.len(),
            "Cached result"
        );
    }

    /// Remove every entry tagged `tag` (or everything for `"*"`).
    /// Returns the number of entries removed.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        if tag == WILDCARD {
            return self.clear();
        }

        let mut inner = self.inner.lock();
        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.tags.contains(tag))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            inner.entries.pop(key);
        }
        inner.counters.invalidations += doomed.len() as u64;

        crate::log_cache!(debug, "invalidate_by_tag", tag = %tag, removed = doomed.len(), "Invalidated by tag");
        doomed.len()
    }

    /// Drop everything; returns the number of entries removed
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.counters.invalidations += removed as u64;
        crate::log_cache!(debug, "clear", removed = removed, "Cache cleared");
        removed
    }

    /// Apply new capacity, TTL and schema version. Shrinking evicts at once;
    /// a version change makes older entries unreadable.
    pub fn apply_config(&self, config: &CacheConfig) {
        let mut inner = self.inner.lock();
        inner.max_entries = config.max_entries.max(1);
        inner.default_ttl = config.ttl().max(MIN_TTL);
        inner.schema_version = config.schema_version;
        inner.evict_overflow();
    }

    pub fn schema_version(&self) -> u32 {
        self.inner.lock().schema_version
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tags of a live entry, for diagnostics
    pub fn tags_of(&self, key: &str) -> Option<BTreeSet<String>> {
        self.inner.lock().entries.peek(key).map(|e| e.tags.clone())
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        inner.counters.snapshot(inner.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn cache(max: usize) -> ResultCache<u32> {
        ResultCache::new(max, Duration::from_secs(60), 2)
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_expiry_counts_eviction_and_miss() {
        let cache = cache(4);
        cache.set("k", 1, tags(&["a"]), Some(Duration::from_secs(5)));
        assert_eq!(cache.get("k"), Some(1));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get("k"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction_is_synchronous() {
        let cache = cache(2);
        cache.set("a", 1, tags(&[]), None);
        cache.set("b", 2, tags(&[]), None);
        // Touch "a" so "b" becomes least recently used
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3, tags(&[]), None);

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_replacing_a_key_is_not_an_eviction() {
        let cache = cache(2);
        cache.set("a", 1, tags(&[]), None);
        cache.set("a", 2, tags(&[]), None);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_by_tag_is_exact_and_idempotent() {
        let cache = cache(8);
        cache.set("a", 1, tags(&["analytics", "student-1"]), None);
        cache.set("b", 2, tags(&["analytics", "student-2"]), None);
        cache.set("c", 3, tags(&["analytics", "student-1", "goal-9"]), None);

        assert_eq!(cache.invalidate_by_tag("student-1"), 2);
        assert_eq!(cache.invalidate_by_tag("student-1"), 0);
        assert!(cache.contains("b"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_wildcard_clears_everything() {
        let cache = cache(8);
        cache.set("a", 1, tags(&["x"]), None);
        cache.set("b", 2, tags(&["y"]), None);
        assert_eq!(cache.invalidate_by_tag("*"), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_schema_mismatch_reads_as_absent() {
        let cache = cache(8);
        cache.set("a", 1, tags(&[]), None);
        let mut config = CacheConfig::default();
        config.schema_version = 3;
        cache.apply_config(&config);

        assert!(!cache.contains("a"));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_shrinking_capacity_evicts_immediately() {
        let cache = cache(4);
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            cache.set(key, i as u32, tags(&[]), None);
        }
        let mut config = CacheConfig::default();
        config.max_entries = 2;
        config.schema_version = 2;
        cache.apply_config(&config);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
    }

    #[tokio::test]
    async fn test_hit_rate() {
        let cache = cache(4);
        cache.set("a", 1, tags(&[]), None);
        cache.get("a");
        cache.get("a");
        cache.get("a");
        cache.get("missing");
        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
    }
}
