//! Cache Statistics Module
//!
//! Tracks cache effectiveness: hits, misses, lazy expirations and invalidations.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of reads that returned a live value
    pub hits: u64,
    /// Number of reads that found nothing usable (absent or expired)
    pub misses: u64,
    /// Number of entries evicted lazily because they had expired
    pub expirations: u64,
    /// Number of entries removed by `invalidate` or `clear`
    pub invalidations: u64,
    /// Current number of entries in the store, expired or not
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Expiration ==
    /// An expired entry was found on read: counts as a miss and an expiration.
    pub fn record_expiration(&mut self) {
        self.misses += 1;
        self.expirations += 1;
    }

    // == Record Invalidations ==
    /// Adds `count` removed entries to the invalidation counter.
    pub fn record_invalidations(&mut self, count: usize) {
        self.invalidations += count as u64;
    }

    // == Update Entry Count ==
    /// Updates the total entries count.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
