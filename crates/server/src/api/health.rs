//! Health check endpoint.

use crate::AppResources;
use axum::{Extension, Json};
use serde::Serialize;
use utoipa::ToSchema;

/// Tag for OpenAPI documentation.
pub const MISC_TAG: &str = "Miscellaneous";

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check endpoint.
#[tracing::instrument(skip(resources))]
#[utoipa::path(
    method(get, head),
    path = "/health",
    tag = MISC_TAG,
    operation_id = "Health Check",
    summary = "Service health check",
    description = "Returns a simple health status indicating the service is running and accepting requests.\n\n\
                   **Use cases:**\n\
                   - Container liveness/readiness probes\n\
                   - Load balancer health checks\n\n\
                   Does not require authentication.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(Extension(resources): Extension<AppResources>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: resources.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
