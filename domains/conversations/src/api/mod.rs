//! API layer for the Conversations domain
//!
//! Read-only HTTP handlers over the most recently published dashboard view.

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use middleware::DashboardState;
pub use routes::routes;
