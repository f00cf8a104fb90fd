//! Authentication module
//!
//! Two shared secrets guard the API: the cron secret on the queue trigger and
//! the admin token on operator endpoints. Either one left unset opens the
//! routes it guards.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use outreach_common::config::ApiConfig;
use outreach_core::{CampaignManager, QueueProcessor};
use outreach_storage::Repositories;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

use crate::handlers::ErrorResponse;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub processor: Arc<QueueProcessor>,
    pub campaigns: Arc<CampaignManager>,
    pub api: ApiConfig,
}

/// Extract a bearer token from the Authorization header
pub fn extract_bearer(req: &Request) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Extract the admin token from `Authorization: Bearer` or `X-API-Key`
pub fn extract_api_key(req: &Request) -> Option<&str> {
    if let Some(token) = extract_bearer(req) {
        return Some(token);
    }

    req.headers().get("x-api-key").and_then(|v| v.to_str().ok())
}

/// Hash a secret for comparison
fn hash_secret(secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// Compare a presented secret with the configured one.
///
/// Both sides are hashed first so the comparison time does not depend on how
/// much of the secret matched.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let a = hash_secret(provided);
    let b = hash_secret(expected);
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "unauthorized".to_string(),
            message: "Unauthorized".to_string(),
        }),
    )
        .into_response()
}

/// Guard for the cron trigger
pub async fn cron_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(secret) = state.api.cron_secret.as_deref().filter(|s| !s.is_empty()) {
        let authorized = extract_bearer(&request).map_or(false, |t| secrets_match(t, secret));
        if !authorized {
            warn!("Rejected cron request to {}", request.uri().path());
            return unauthorized();
        }
    }

    next.run(request).await
}

/// Guard for operator endpoints
pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(token) = state.api.admin_token.as_deref().filter(|s| !s.is_empty()) {
        let authorized = extract_api_key(&request).map_or(false, |t| secrets_match(t, token));
        if !authorized {
            warn!("Missing or invalid admin token in request to {}", request.uri().path());
            return unauthorized();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3cret "));
        assert!(!secrets_match("", "s3cret"));
    }

    #[test]
    fn test_extract_tokens() {
        let req = Request::builder()
            .header("authorization", "Bearer abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer(&req), Some("abc"));
        assert_eq!(extract_api_key(&req), Some("abc"));

        let req = Request::builder()
            .header("x-api-key", "xyz")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer(&req), None);
        assert_eq!(extract_api_key(&req), Some("xyz"));

        let req = Request::builder()
            .header("authorization", "Basic abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer(&req), None);
    }
}
