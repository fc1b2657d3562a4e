//! Query Module
//!
//! Binds an async fetcher to one cache key and TTL and exposes the result
//! as an observable `QueryState`.

mod cached_query;
mod state;

pub use cached_query::{CachedQuery, FetchFuture};
pub use state::{QueryOptions, QueryState};

// == Public Constants ==
/// TTL used when a query does not set one (one minute)
pub const DEFAULT_TTL_MS: u64 = 60_000;
