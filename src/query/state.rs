//! Query state and options.

use serde::Serialize;

use super::DEFAULT_TTL_MS;

// == Query State ==
/// What a query currently shows: last known data, whether a fetch is in
/// flight, and the last fetch error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> QueryState<T> {
    /// Idle state showing `data`, if any.
    pub fn idle(data: Option<T>) -> Self {
        Self {
            data,
            loading: false,
            error: None,
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::idle(None)
    }
}

// == Query Options ==
/// Per-query settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// How long a successful result stays fresh in the cache
    pub ttl_ms: u64,
    /// When false the query never fetches on its own
    pub enabled: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            enabled: true,
        }
    }
}
