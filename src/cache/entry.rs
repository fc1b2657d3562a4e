//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use serde_json::Value;

// == Cache Entry ==
/// Represents a single cache entry with value and expiry metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The stored value, opaque to the store
    pub value: Value,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: i64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl_ms` after `now_ms`.
    pub fn new(value: Value, ttl_ms: u64, now_ms: i64) -> Self {
        let ttl = i64::try_from(ttl_ms).unwrap_or(i64::MAX);
        Self {
            value,
            expires_at: now_ms.saturating_add(ttl),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: the entry stays live up to and including
    /// `expires_at` and is expired only once `now_ms` is strictly past it.
    /// A zero TTL therefore survives a read in the same millisecond.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at
    }
}
