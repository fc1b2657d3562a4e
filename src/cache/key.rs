//! Cache Key Helpers
//!
//! Builds `domain:operation[:params]` keys and `domain:*` invalidation patterns.

use serde::Serialize;
use serde_json::Value;

use crate::cache::WILDCARD;

/// `domain:operation`, e.g. `users:me`.
pub fn key(domain: &str, operation: &str) -> String {
    format!("{}:{}", domain, operation)
}

/// `domain:operation:{params}` with params serialized canonically.
///
/// Object members are emitted in sorted order at every depth and top-level
/// `null` members are dropped, so parameter sets that differ only in field
/// order or in unset optionals produce the same key.
pub fn key_with_params<P: Serialize + ?Sized>(domain: &str, operation: &str, params: &P) -> String {
    format!("{}:{}:{}", domain, operation, canonical_params(params))
}

/// `domain:*`, matching every key in the domain.
pub fn pattern(domain: &str) -> String {
    format!("{}:{}", domain, WILDCARD)
}

fn canonical_params<P: Serialize + ?Sized>(params: &P) -> String {
    // serde_json's default Map is ordered, which gives the sorting for free
    match serde_json::to_value(params) {
        Ok(Value::Object(mut map)) => {
            map.retain(|_, v| !v.is_null());
            Value::Object(map).to_string()
        }
        Ok(Value::Null) | Err(_) => "{}".to_string(),
        Ok(other) => other.to_string(),
    }
}
