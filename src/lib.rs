//! Ticket Cache - client-side data layer for the campus ticket desk
//!
//! Provides a session-lifetime TTL cache, cached queries over async fetchers,
//! and a thin REST client for the complaint-tracking backend.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod query;

pub use api::{ApiClient, TicketDesk};
pub use cache::Cache;
pub use config::Config;
pub use error::{ClientError, Result};
pub use query::{CachedQuery, QueryOptions, QueryState};
