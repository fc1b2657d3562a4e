//! Cache Store Module
//!
//! Key-value storage with per-entry TTL, lazy expiry and prefix invalidation.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, Clock, SystemClock, WILDCARD};

// == Cache Store ==
/// Main cache storage with TTL support.
///
/// There is no background sweep: an expired entry stays in the map until a
/// `get` on its key finds it, so `len` may count logically expired entries.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Effectiveness counters
    stats: CacheStats,
    /// Time source for expiry
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store driven by the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            clock,
        }
    }

    // == Set ==
    /// Stores a value under `key`, expiring `ttl_ms` milliseconds from now.
    ///
    /// Any existing entry at `key` is replaced, expiry included.
    pub fn set(&mut self, key: impl Into<String>, value: Value, ttl_ms: u64) {
        let key = key.into();
        let entry = CacheEntry::new(value, ttl_ms, self.clock.now_ms());
        debug!(key = %key, ttl_ms, "cache set");
        self.entries.insert(key, entry);
        self.stats.set_total_entries(self.entries.len());
    }

    // == Get ==
    /// Retrieves the value stored under the exact `key`.
    ///
    /// Returns `None` if the key is absent or expired; an expired entry is
    /// removed as a side effect.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.stats.record_miss();
                debug!(key, "cache miss");
                return None;
            }
        };

        if expired {
            self.entries.remove(key);
            self.stats.record_expiration();
            self.stats.set_total_entries(self.entries.len());
            debug!(key, "cache expired");
            return None;
        }

        self.stats.record_hit();
        debug!(key, "cache hit");
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Peek ==
    /// Returns the live value at `key` without counting a hit or miss.
    ///
    /// Expired entries are reported as absent but left for the next `get`
    /// to evict.
    pub fn peek(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    // == Invalidate ==
    /// Removes entries by exact key or by `prefix*` pattern.
    ///
    /// Each pattern is applied independently, in the order given. Returns the
    /// total number of entries removed.
    pub fn invalidate<I, S>(&mut self, patterns: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = 0;

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let count = match pattern.strip_suffix(WILDCARD) {
                Some(prefix) => {
                    let before = self.entries.len();
                    self.entries.retain(|key, _| !key.starts_with(prefix));
                    before - self.entries.len()
                }
                None => usize::from(self.entries.remove(pattern).is_some()),
            };
            debug!(pattern, removed = count, "cache invalidate");
            removed += count;
        }

        self.stats.record_invalidations(removed);
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    // == Clear ==
    /// Removes every entry. Returns the number of entries dropped.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.stats.record_invalidations(removed);
        self.stats.set_total_entries(0);
        removed
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    // == Length ==
    /// Returns the number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}
