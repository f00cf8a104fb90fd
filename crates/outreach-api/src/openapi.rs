//! OpenAPI documentation
//!
//! Serves the OpenAPI 3 document at `/openapi.json` and Swagger UI at `/docs`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{campaigns, cron, health, queue, ErrorResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Outreach API",
        description = "Campaign send scheduler.\n\nThe cron trigger takes `Authorization: Bearer <cron secret>`. Operator endpoints take `Authorization: Bearer <admin token>` or `X-API-Key: <admin token>`."
    ),
    paths(
        health::health,
        health::readiness,
        cron::process_queue,
        queue::queue_status,
        campaigns::create_campaign,
        campaigns::get_campaign,
        campaigns::replace_recipients,
        campaigns::launch_campaign,
        campaigns::pause_campaign,
        campaigns::resume_campaign,
        campaigns::stop_campaign,
        campaigns::delete_campaign,
        campaigns::campaign_activity,
    ),
    components(schemas(
        ErrorResponse,
        health::HealthResponse,
        health::ReadinessResponse,
        cron::ProcessQueueResponse,
        cron::CampaignPassResponse,
        queue::QueueStatusResponse,
        campaigns::CampaignResponse,
        campaigns::CampaignDetailResponse,
        campaigns::RecipientCountsResponse,
        campaigns::CreateCampaignRequest,
        campaigns::ReplaceRecipientsRequest,
        campaigns::ActivityResponse,
        campaigns::ActivityEntryResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "queue", description = "Queue trigger and status"),
        (name = "campaigns", description = "Campaign lifecycle")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "cron_secret",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Swagger UI plus the OpenAPI document
pub fn create_openapi_routes() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi())
}
