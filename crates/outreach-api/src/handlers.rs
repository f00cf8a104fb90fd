//! API request handlers

pub mod campaigns;
pub mod cron;
pub mod health;
pub mod queue;

use axum::{http::StatusCode, Json};
use outreach_core::CampaignError;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub error: String,
    /// Human-readable message
    pub message: String,
}

/// Error half of every handler result
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

/// Map a store error, hiding internal details from the caller
pub(crate) fn store_error(e: outreach_common::Error, context: &str) -> ApiError {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("{}: {}", context, e);
        return api_error(status, "internal_error", context);
    }
    api_error(status, &e.code().to_ascii_lowercase(), e.to_string())
}

pub(crate) fn campaign_error(e: CampaignError) -> ApiError {
    match e {
        CampaignError::NotFound => api_error(StatusCode::NOT_FOUND, "not_found", e.to_string()),
        CampaignError::AlreadyActive | CampaignError::InvalidTransition { .. } => {
            api_error(StatusCode::CONFLICT, "invalid_state", e.to_string())
        }
        CampaignError::NoTemplate | CampaignError::NoRecipients | CampaignError::Validation(_) => {
            api_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
        CampaignError::Store(inner) => store_error(inner, "Campaign operation failed"),
    }
}
