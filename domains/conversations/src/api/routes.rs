//! Route definitions for Conversations domain API

use axum::{routing::get, Router};

use super::handlers::dashboard;
use super::middleware::DashboardState;

/// Create all Conversations domain API routes
pub fn routes() -> Router<DashboardState> {
    Router::new()
        .route("/v1/dashboard", get(dashboard::get_dashboard))
        .route("/v1/dashboard/active", get(dashboard::list_active))
        .route("/v1/dashboard/metrics", get(dashboard::get_metrics))
        .route(
            "/v1/dashboard/conversations/{id}",
            get(dashboard::get_conversation),
        )
}
