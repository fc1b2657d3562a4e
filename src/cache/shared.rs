//! Shared Cache Handle
//!
//! Application-wide handle over a single `CacheStore`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use crate::cache::{CacheStats, CacheStore, Clock};

// == Cache ==
/// Cheaply clonable handle to the one store shared by every query.
///
/// Every operation takes the lock, does its work synchronously and releases
/// it before returning, so no cache access ever spans an `.await`.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    store: Arc<Mutex<CacheStore>>,
}

impl Cache {
    /// Creates an empty cache on the wall clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(Mutex::new(CacheStore::with_clock(clock))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheStore> {
        // The store holds no invariant a panicking writer could break halfway
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // == Get ==
    /// Returns the live value at `key` decoded as `T`.
    ///
    /// A stored value that does not decode as `T` is reported as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.lock().get(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key, error = %e, "cached value has unexpected shape");
                None
            }
        }
    }

    /// Like [`get`](Self::get) but leaves the hit/miss counters and any
    /// expired entry alone.
    pub fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.lock().peek(key)?;
        serde_json::from_value(value).ok()
    }

    // == Set ==
    /// Stores `value` under `key` for `ttl_ms` milliseconds.
    ///
    /// Values that cannot be represented as JSON are not stored.
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl_ms: u64) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => self.lock().set(key, value, ttl_ms),
            Err(e) => warn!(key = %key, error = %e, "value not cacheable"),
        }
    }

    // == Invalidate ==
    /// Removes exact keys and `prefix*` patterns. Returns entries removed.
    pub fn invalidate<I, S>(&self, patterns: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.lock().invalidate(patterns)
    }

    // == Clear ==
    /// Drops every entry. Call once on logout.
    pub fn clear(&self) {
        let removed = self.lock().clear();
        info!(removed, "cache cleared");
    }

    // == Size ==
    /// Number of stored entries, including expired ones not yet evicted.
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }
}
