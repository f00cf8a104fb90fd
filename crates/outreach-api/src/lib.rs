//! Outreach API - REST API server
//!
//! This crate provides the HTTP surface of the campaign scheduler: the cron
//! queue trigger, queue status, campaign lifecycle endpoints, health checks and
//! Prometheus metrics.

pub mod auth;
pub mod handlers;
pub mod openapi;
pub mod routes;

pub use auth::AppState;
pub use openapi::create_openapi_routes;
pub use routes::create_router;
