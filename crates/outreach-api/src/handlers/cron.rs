//! Queue trigger handler

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use outreach_common::Error;
use outreach_core::scheduler::{CampaignPassResult, QueueResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{api_error, store_error, ApiError, ErrorResponse};
use crate::auth::AppState;

/// Per-campaign outcome of a pass
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CampaignPassResponse {
    pub id: Uuid,
    pub name: String,
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CampaignPassResult> for CampaignPassResponse {
    fn from(r: CampaignPassResult) -> Self {
        Self {
            id: r.id,
            name: r.name,
            sent: r.sent,
            failed: r.failed,
            skipped: r.skipped,
            error: r.error,
        }
    }
}

/// Result of one queue pass
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProcessQueueResponse {
    pub success: bool,
    /// Emails sent
    pub processed: u32,
    /// Emails that failed at the provider
    pub errors: u32,
    pub campaigns: Vec<CampaignPassResponse>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl From<QueueResult> for ProcessQueueResponse {
    fn from(r: QueueResult) -> Self {
        Self {
            success: r.success,
            processed: r.processed,
            errors: r.errors,
            campaigns: r.campaigns.into_iter().map(Into::into).collect(),
            message: r.message,
            timestamp: Utc::now(),
        }
    }
}

/// Run one queue pass
///
/// The pass runs on its own task and finishes even if the caller disconnects.
///
/// GET|POST /api/v1/cron/process-queue
#[utoipa::path(
    post,
    path = "/api/v1/cron/process-queue",
    tag = "queue",
    responses(
        (status = 200, description = "Pass finished", body = ProcessQueueResponse),
        (status = 401, description = "Missing or wrong cron secret", body = ErrorResponse),
        (status = 409, description = "A pass is already running", body = ErrorResponse)
    ),
    security(("cron_secret" = []))
)]
pub async fn process_queue(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ProcessQueueResponse>, ApiError> {
    info!("Queue pass triggered over HTTP");

    let processor = state.processor.clone();
    let pass = tokio::spawn(async move { processor.process_queue().await });

    match pass.await {
        Ok(Ok(result)) => Ok(Json(result.into())),
        Ok(Err(Error::Conflict(msg))) => Err(api_error(StatusCode::CONFLICT, "conflict", msg)),
        Ok(Err(e)) => Err(store_error(e, "Queue processing failed")),
        Err(e) => {
            error!("Queue pass task failed: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Queue processing failed",
            ))
        }
    }
}
