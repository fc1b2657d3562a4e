//! Request DTOs for the ticket desk API
//!
//! Bodies and query parameters sent to the backend. Filter structs double as
//! cache-key parameters, so unset fields are skipped when serialized.

use chrono::NaiveDate;
use serde::Serialize;

use super::responses::{ComplaintStatus, Priority};

/// Maximum complaint title length accepted before sending
pub const MAX_TITLE_LENGTH: usize = 200;

/// Body for `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Some("A valid email address is required".to_string());
        }
        if self.password.is_empty() {
            return Some("Password cannot be empty".to_string());
        }
        None
    }
}

/// Query parameters for `GET /complaints`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComplaintFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ComplaintStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Body for `POST /complaints`
#[derive(Debug, Clone, Serialize)]
pub struct NewComplaint {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
}

impl NewComplaint {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.title.trim().is_empty() {
            return Some("Title cannot be empty".to_string());
        }
        if self.title.len() > MAX_TITLE_LENGTH {
            return Some(format!(
                "Title exceeds maximum length of {} characters",
                MAX_TITLE_LENGTH
            ));
        }
        if self.description.trim().is_empty() {
            return Some("Description cannot be empty".to_string());
        }
        if self.category.trim().is_empty() {
            return Some("Category cannot be empty".to_string());
        }
        None
    }
}

/// Body for `PATCH /complaints/{id}/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub status: ComplaintStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Query parameters for `GET /reports`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}
