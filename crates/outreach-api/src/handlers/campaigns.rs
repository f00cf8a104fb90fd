//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use outreach_core::scheduler::lifecycle::ActivityEntry;
use outreach_core::scheduler::{CampaignActivity, CampaignDetail};
use outreach_storage::models::{Campaign, CreateCampaign};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{campaign_error, ApiError, ErrorResponse};
use crate::auth::AppState;

/// Campaign response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub name: String,
    pub template_id: Option<Uuid>,
    pub status: String,
    pub daily_limit: i32,
    pub send_start_hour: i32,
    pub send_end_hour: i32,
    pub total_recipients: i32,
    pub sent_count: i32,
    pub progress_percentage: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        let progress = c.progress_percentage();
        Self {
            id: c.id,
            name: c.name,
            template_id: c.template_id,
            status: c.status,
            daily_limit: c.daily_limit,
            send_start_hour: c.send_start_hour,
            send_end_hour: c.send_end_hour,
            total_recipients: c.total_recipients,
            sent_count: c.sent_count,
            progress_percentage: progress,
            created_at: c.created_at,
            started_at: c.started_at,
            completed_at: c.completed_at,
        }
    }
}

/// Recipient rows per status
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecipientCountsResponse {
    pub pending: i64,
    pub sending: i64,
    pub sent: i64,
    pub failed: i64,
    pub skipped: i64,
}

/// Campaign with template name and recipient breakdown
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CampaignDetailResponse {
    #[serde(flatten)]
    pub campaign: CampaignResponse,
    pub template_name: Option<String>,
    pub recipients: RecipientCountsResponse,
}

impl From<CampaignDetail> for CampaignDetailResponse {
    fn from(d: CampaignDetail) -> Self {
        Self {
            campaign: d.campaign.into(),
            template_name: d.template_name,
            recipients: RecipientCountsResponse {
                pending: d.recipients.pending,
                sending: d.recipients.sending,
                sent: d.recipients.sent,
                failed: d.recipients.failed,
                skipped: d.recipients.skipped,
            },
        }
    }
}

/// Request body for creating a campaign
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub template_id: Option<Uuid>,
    /// Defaults to 10
    pub daily_limit: Option<i32>,
    /// Defaults to 9
    pub send_start_hour: Option<i32>,
    /// Defaults to 18
    pub send_end_hour: Option<i32>,
    #[serde(default)]
    pub client_ids: Vec<Uuid>,
}

/// Request body for replacing a campaign's recipients
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceRecipientsRequest {
    pub client_ids: Vec<Uuid>,
}

/// Query parameters for campaign activity
#[derive(Debug, Deserialize, IntoParams)]
pub struct ActivityQuery {
    /// Number of rows (default 20)
    pub limit: Option<i64>,
}

/// One sent email
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityEntryResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub status: String,
    pub sent_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
}

impl From<ActivityEntry> for ActivityEntryResponse {
    fn from(e: ActivityEntry) -> Self {
        Self {
            id: e.id,
            client_id: e.client_id,
            company_name: e.company_name,
            email: e.email,
            subject: e.subject,
            status: e.status,
            sent_at: e.sent_at,
            opened_at: e.opened_at,
            clicked_at: e.clicked_at,
        }
    }
}

/// Recent sends for a campaign
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityResponse {
    pub campaign_id: Uuid,
    pub today_sent_count: i64,
    pub activity: Vec<ActivityEntryResponse>,
}

impl From<CampaignActivity> for ActivityResponse {
    fn from(a: CampaignActivity) -> Self {
        Self {
            campaign_id: a.campaign_id,
            today_sent_count: a.sent_today,
            activity: a.recent.into_iter().map(Into::into).collect(),
        }
    }
}

/// Create a new campaign
///
/// POST /api/v1/campaigns
#[utoipa::path(
    post,
    path = "/api/v1/campaigns",
    tag = "campaigns",
    request_body = CreateCampaignRequest,
    responses(
        (status = 201, description = "Campaign created", body = CampaignResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 422, description = "Unknown template or client", body = ErrorResponse)
    )
)]
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CampaignResponse>), ApiError> {
    let campaign = state
        .campaigns
        .create(CreateCampaign {
            name: input.name,
            template_id: input.template_id,
            daily_limit: input.daily_limit,
            send_start_hour: input.send_start_hour,
            send_end_hour: input.send_end_hour,
            client_ids: input.client_ids,
        })
        .await
        .map_err(campaign_error)?;

    Ok((StatusCode::CREATED, Json(campaign.into())))
}

/// Get a campaign with its recipient breakdown
///
/// GET /api/v1/campaigns/:campaign_id
#[utoipa::path(
    get,
    path = "/api/v1/campaigns/{campaign_id}",
    tag = "campaigns",
    params(("campaign_id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign", body = CampaignDetailResponse),
        (status = 404, description = "Campaign not found", body = ErrorResponse)
    )
)]
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignDetailResponse>, ApiError> {
    let detail = state
        .campaigns
        .detail(campaign_id)
        .await
        .map_err(campaign_error)?;
    Ok(Json(detail.into()))
}

/// Replace a campaign's recipients
///
/// PUT /api/v1/campaigns/:campaign_id/recipients
#[utoipa::path(
    put,
    path = "/api/v1/campaigns/{campaign_id}/recipients",
    tag = "campaigns",
    params(("campaign_id" = Uuid, Path, description = "Campaign ID")),
    request_body = ReplaceRecipientsRequest,
    responses(
        (status = 200, description = "Recipients replaced", body = CampaignResponse),
        (status = 404, description = "Campaign not found", body = ErrorResponse),
        (status = 409, description = "Campaign is active or finished", body = ErrorResponse)
    )
)]
pub async fn replace_recipients(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    Json(input): Json<ReplaceRecipientsRequest>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .campaigns
        .replace_recipients(campaign_id, &input.client_ids)
        .await
        .map_err(campaign_error)?;
    Ok(Json(campaign.into()))
}

/// Launch a draft or scheduled campaign
///
/// POST /api/v1/campaigns/:campaign_id/launch
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{campaign_id}/launch",
    tag = "campaigns",
    params(("campaign_id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign launched", body = CampaignResponse),
        (status = 400, description = "Missing template or recipients", body = ErrorResponse),
        (status = 409, description = "Campaign cannot be launched from its state", body = ErrorResponse)
    )
)]
pub async fn launch_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .campaigns
        .launch(campaign_id)
        .await
        .map_err(campaign_error)?;
    Ok(Json(campaign.into()))
}

/// Pause an active campaign
///
/// POST /api/v1/campaigns/:campaign_id/pause
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{campaign_id}/pause",
    tag = "campaigns",
    params(("campaign_id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign paused", body = CampaignResponse),
        (status = 409, description = "Campaign is not active", body = ErrorResponse)
    )
)]
pub async fn pause_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .campaigns
        .pause(campaign_id)
        .await
        .map_err(campaign_error)?;
    Ok(Json(campaign.into()))
}

/// Resume a paused campaign
///
/// POST /api/v1/campaigns/:campaign_id/resume
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{campaign_id}/resume",
    tag = "campaigns",
    params(("campaign_id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign resumed", body = CampaignResponse),
        (status = 409, description = "Campaign is not paused", body = ErrorResponse)
    )
)]
pub async fn resume_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .campaigns
        .resume(campaign_id)
        .await
        .map_err(campaign_error)?;
    Ok(Json(campaign.into()))
}

/// Stop a campaign for good
///
/// POST /api/v1/campaigns/:campaign_id/stop
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{campaign_id}/stop",
    tag = "campaigns",
    params(("campaign_id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign stopped", body = CampaignResponse),
        (status = 409, description = "Campaign already finished", body = ErrorResponse)
    )
)]
pub async fn stop_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .campaigns
        .stop(campaign_id)
        .await
        .map_err(campaign_error)?;
    Ok(Json(campaign.into()))
}

/// Delete a campaign
///
/// DELETE /api/v1/campaigns/:campaign_id
#[utoipa::path(
    delete,
    path = "/api/v1/campaigns/{campaign_id}",
    tag = "campaigns",
    params(("campaign_id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 204, description = "Campaign deleted"),
        (status = 404, description = "Campaign not found", body = ErrorResponse)
    )
)]
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .campaigns
        .delete(campaign_id)
        .await
        .map_err(campaign_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Recent email activity for a campaign
///
/// GET /api/v1/campaigns/:campaign_id/activity
#[utoipa::path(
    get,
    path = "/api/v1/campaigns/{campaign_id}/activity",
    tag = "campaigns",
    params(
        ("campaign_id" = Uuid, Path, description = "Campaign ID"),
        ActivityQuery
    ),
    responses(
        (status = 200, description = "Recent activity", body = ActivityResponse),
        (status = 404, description = "Campaign not found", body = ErrorResponse)
    )
)]
pub async fn campaign_activity(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ActivityResponse>, ApiError> {
    let activity = state
        .campaigns
        .activity(campaign_id, query.limit)
        .await
        .map_err(campaign_error)?;
    Ok(Json(activity.into()))
}
