//! Queue status handler

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::{store_error, ApiError, ErrorResponse};
use crate::auth::AppState;

/// Backlog snapshot for dashboards
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueStatusResponse {
    pub active_campaigns: i64,
    /// Pending recipients across all campaigns
    pub pending_emails: i64,
    /// Emails sent since local midnight
    pub sent_today: i64,
    /// Whether a pass is running right now
    pub processing: bool,
    pub timestamp: DateTime<Utc>,
}

/// Get queue status
///
/// GET /api/v1/queue/status
#[utoipa::path(
    get,
    path = "/api/v1/queue/status",
    tag = "queue",
    responses(
        (status = 200, description = "Queue status", body = QueueStatusResponse),
        (status = 500, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn queue_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<QueueStatusResponse>, ApiError> {
    let status = state
        .processor
        .queue_status()
        .await
        .map_err(|e| store_error(e, "Failed to fetch queue status"))?;

    Ok(Json(QueueStatusResponse {
        active_campaigns: status.active_campaigns,
        pending_emails: status.pending_emails,
        sent_today: status.sent_today,
        processing: state.processor.is_running(),
        timestamp: Utc::now(),
    }))
}
