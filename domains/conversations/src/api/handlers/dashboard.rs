//! Dashboard API handlers

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use pharmydash_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::api::middleware::DashboardState;
use crate::domain::metrics::{MetricsWindow, WindowStats};
use crate::domain::status::Status;
use crate::domain::view::{ConversationView, DashboardView, ViewCounts, WindowReport};

/// Query params for the active list
#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    pub status: Option<Status>,
}

/// Query params for the metrics cards
#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub window: Option<MetricsWindow>,
}

#[derive(Debug, Serialize)]
pub struct ActiveResponse {
    pub revision: u64,
    pub generated_at: DateTime<Utc>,
    pub conversations: Vec<ConversationView>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub revision: u64,
    pub generated_at: DateTime<Utc>,
    pub headline: WindowStats,
    pub counts: ViewCounts,
    pub windows: Vec<WindowReport>,
}

/// Unwrap query params, reporting malformed ones as validation errors
fn query_params<T>(query: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| Error::Validation(rejection.body_text()))
}

/// Full dashboard view
pub async fn get_dashboard(State(state): State<DashboardState>) -> Result<Json<DashboardView>> {
    let view = state.loaded_view()?;
    Ok(Json(view.as_ref().clone()))
}

/// Operational list, optionally narrowed to one status
pub async fn list_active(
    State(state): State<DashboardState>,
    query: std::result::Result<Query<ActiveQuery>, QueryRejection>,
) -> Result<Json<ActiveResponse>> {
    let query = query_params(query)?;
    let view = state.loaded_view()?;

    let conversations = view
        .active
        .iter()
        .filter(|c| query.status.map_or(true, |status| c.status == status))
        .cloned()
        .collect();

    Ok(Json(ActiveResponse {
        revision: view.revision,
        generated_at: view.generated_at,
        conversations,
    }))
}

/// Attendance cards and status counts
pub async fn get_metrics(
    State(state): State<DashboardState>,
    query: std::result::Result<Query<MetricsQuery>, QueryRejection>,
) -> Result<Json<MetricsResponse>> {
    let query = query_params(query)?;
    let view = state.loaded_view()?;

    let windows: Vec<WindowReport> = match query.window {
        Some(window) => {
            let report = view
                .windows
                .iter()
                .find(|report| report.window == window)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("Metrics window {window} not configured")))?;
            vec![report]
        }
        None => view.windows.clone(),
    };

    Ok(Json(MetricsResponse {
        revision: view.revision,
        generated_at: view.generated_at,
        headline: view.headline,
        counts: view.counts.clone(),
        windows,
    }))
}

/// Get a single conversation by ID
pub async fn get_conversation(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationView>> {
    let view = state.loaded_view()?;

    view.conversation(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| Error::NotFound("Conversation not found".to_string()))
}
