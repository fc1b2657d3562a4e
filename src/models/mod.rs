//! Request and Response models for the ticket desk API
//!
//! This module defines the DTOs (Data Transfer Objects) exchanged with the
//! backend and cached by the query layer.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{ComplaintFilters, Credentials, NewComplaint, ReportParams, StatusUpdate};
pub use responses::{
    Complaint, ComplaintStatus, DepartmentSummary, LoginResponse, Priority, Role, User,
};
