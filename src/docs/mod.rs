use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service accepts connections", body = HealthResponse),
        (status = 503, description = "Service cannot admit clients", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Instance diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Sessions, rooms, caches and host load", body = DiagnosticsResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not the API service", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Evict cached access facts of a learning path after a collaborator change
#[utoipa::path(
    post,
    path = "/api/v1/paths/{path_id}/access/invalidate",
    params(
        ("path_id" = String, Path, description = "Learning path id")
    ),
    responses(
        (status = 200, description = "Cache evicted and room members re-checked", body = AccessInvalidateResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not the API service", body = ErrorResponse),
        (status = 500, description = "Storage unavailable", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn access_invalidate_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        access_invalidate_doc,
    ),
    components(
        schemas(HealthResponse, DiagnosticsResponse, AccessInvalidateResponse, ErrorResponse)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
