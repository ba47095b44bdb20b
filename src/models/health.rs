use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Liveness or readiness of the sync service
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub service: String,
    pub status: String,
    pub message: String,
}
