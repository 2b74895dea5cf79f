//! Exact hit/miss/eviction counters for the result cache.

use serde::{Deserialize, Serialize};

/// Snapshot of cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    /// Capacity evictions plus lazily expired reads
    pub evictions: u64,
    /// Subset of `evictions` caused by TTL expiry
    pub expirations: u64,
    /// Entries removed through tag invalidation or `clear`
    pub invalidations: u64,
    pub size: usize,
    pub hit_rate: f64,
}

impl CacheStats {
    /// Format statistics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "Size: {} | Hits: {} | Misses: {} | Hit rate: {:.1}% | Evictions: {}",
            self.size,
            self.hits,
            self.misses,
            self.hit_rate * 100.0,
            self.evictions
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
}

impl Counters {
    pub fn snapshot(&self, size: usize) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            sets: self.sets,
            evictions: self.evictions,
            expirations: self.expirations,
            invalidations: self.invalidations,
            size,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
        }
    }
}
