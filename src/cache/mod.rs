//! Cache Module
//!
//! Session-lifetime key-value cache with per-entry TTL, lazy expiry and
//! prefix invalidation.

mod clock;
mod entry;
mod key;
mod shared;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use key::{key, key_with_params, pattern};
pub use shared::Cache;
pub use stats::CacheStats;
pub use store::CacheStore;

// == Public Constants ==
/// Suffix marking an invalidation pattern as a prefix match
pub const WILDCARD: char = '*';
