//! Error types for the ticket desk client
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Client Error Enum ==
/// Unified error type for the ticket desk client.
///
/// The cache store has no error conditions of its own (absence is a normal
/// result), so every variant here originates from a fetch or its setup. The
/// query layer only ever sees the rendered message.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure (connection, timeout, TLS)
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request data rejected before it was sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backend answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body was not the expected JSON
    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// An authenticated endpoint was called without a stored token
    #[error("Not authenticated")]
    Unauthenticated,

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Builds an `Api` error from a status code and a raw response body.
    ///
    /// Uses the body's `message` or `error` field when the body is a JSON
    /// object carrying one, otherwise the trimmed body text.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| {
                json.get("message")
                    .or_else(|| json.get("error"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    trimmed.to_string()
                }
            });

        ClientError::Api { status, message }
    }

    /// Returns true for 401 responses and missing tokens.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ClientError::Unauthenticated | ClientError::Api { status: 401, .. }
        )
    }
}

// == Result Type Alias ==
/// Convenience Result type for the ticket desk client.
pub type Result<T> = std::result::Result<T, ClientError>;
