//! Response DTOs for the ticket desk API
//!
//! Shapes returned by the backend. Every type is also `Serialize` so it can
//! be stored in the cache.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Staff,
    Admin,
}

/// Ticket lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplaintStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Authenticated user (`GET /users/me`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
}

/// Response body for `POST /auth/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// A complaint ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: ComplaintStatus,
    pub priority: Priority,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub submitted_by: Option<u64>,
    #[serde(default)]
    pub assigned_to: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Department analytics (`GET /analytics/department/summary`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DepartmentSummary {
    pub department: Option<String>,
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
    pub average_resolution_hours: Option<f64>,
}

impl DepartmentSummary {
    /// Count for one status, zero when the backend omitted it.
    pub fn count(&self, status: ComplaintStatus) -> u64 {
        let key = match serde_json::to_value(status) {
            Ok(serde_json::Value::String(key)) => key,
            _ => return 0,
        };
        self.by_status.get(&key).copied().unwrap_or(0)
    }
}
