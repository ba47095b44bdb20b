use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response after evicting the cached access facts of a learning path
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessInvalidateResponse {
    pub path_id: String,
    pub revoked_connections: u32,
    /// Members left in place because their access could not be resolved
    pub unchecked_connections: u32,
}
