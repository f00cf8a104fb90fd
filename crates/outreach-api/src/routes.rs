//! API routes

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{admin_auth_middleware, cron_auth_middleware, AppState};
use crate::handlers::{campaigns, cron, health, queue};
use crate::openapi::create_openapi_routes;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.api.cors_origins);
    let state = Arc::new(state);

    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Queue trigger, guarded by the cron secret
    let cron_routes = Router::new()
        .route(
            "/process-queue",
            get(cron::process_queue).post(cron::process_queue),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            cron_auth_middleware,
        ));

    // Campaign routes
    let campaign_routes = Router::new()
        .route("/", post(campaigns::create_campaign))
        .route(
            "/:campaign_id",
            get(campaigns::get_campaign).delete(campaigns::delete_campaign),
        )
        .route("/:campaign_id/recipients", put(campaigns::replace_recipients))
        .route("/:campaign_id/launch", post(campaigns::launch_campaign))
        .route("/:campaign_id/pause", post(campaigns::pause_campaign))
        .route("/:campaign_id/resume", post(campaigns::resume_campaign))
        .route("/:campaign_id/stop", post(campaigns::stop_campaign))
        .route("/:campaign_id/activity", get(campaigns::campaign_activity));

    // Operator routes, guarded by the admin token
    let operator_routes = Router::new()
        .route("/queue/status", get(queue::queue_status))
        .nest("/campaigns", campaign_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    let api_v1 = Router::new()
        .nest("/cron", cron_routes)
        .merge(operator_routes)
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(health::metrics))
        .with_state(state);

    // Combine all routes
    let router = Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .merge(metrics_routes)
        .merge(create_openapi_routes())
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    if origins.iter().any(|o| o == "*") {
        return Some(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
