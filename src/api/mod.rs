//! API Module
//!
//! REST client for the ticket desk backend and the per-domain query layer
//! built on top of it.
//!
//! # Endpoints
//! - `POST /auth/login` - Exchange credentials for a bearer token
//! - `GET /users/me` - Current user
//! - `GET /complaints` - Filtered complaint list
//! - `GET /complaints/{id}` - Single complaint
//! - `POST /complaints` - Submit a complaint
//! - `PATCH /complaints/{id}/status` - Move a complaint through its lifecycle
//! - `GET /analytics/department/summary` - Department analytics
//! - `GET /reports` - Generated reports

pub mod client;
pub mod desk;

pub use client::ApiClient;
pub use desk::TicketDesk;
