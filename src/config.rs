//! Configuration Module
//!
//! Handles loading client configuration from environment variables.

use std::env;
use std::time::Duration;

/// Client configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the ticket desk REST API
    pub api_url: String,
    /// Default TTL in milliseconds for cached queries
    pub default_ttl_ms: u64,
    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
    /// Login email used by the smoke-test binary
    pub email: Option<String>,
    /// Login password used by the smoke-test binary
    pub password: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `TICKET_API_URL` - Backend base URL (default: http://localhost:8080/api)
    /// - `TICKET_DEFAULT_TTL_MS` - Default query TTL in ms (default: 60000)
    /// - `TICKET_REQUEST_TIMEOUT_SECS` - HTTP timeout in seconds (default: 30)
    /// - `TICKET_EMAIL` / `TICKET_PASSWORD` - Optional login credentials
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: env::var("TICKET_API_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.api_url),
            default_ttl_ms: env::var("TICKET_DEFAULT_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_ttl_ms),
            request_timeout_secs: env::var("TICKET_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            email: env::var("TICKET_EMAIL").ok(),
            password: env::var("TICKET_PASSWORD").ok(),
        }
    }

    /// HTTP timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/api".to_string(),
            default_ttl_ms: 60_000,
            request_timeout_secs: 30,
            email: None,
            password: None,
        }
    }
}
