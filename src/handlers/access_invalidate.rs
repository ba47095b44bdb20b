use crate::{auth::auth, models::{AccessInvalidateResponse, ErrorResponse}, state::AppState};
use axum::{extract::{Extension, Path, State}, http::StatusCode, Json};
use tracing::{info, warn};

/// Called by the API service after a collaborator of a path was added,
/// removed or changed role. Evicts the cached access facts and removes room
/// members who can no longer view the path. Members whose access could not be
/// resolved stay joined and are reported as unchecked.
pub async fn access_invalidate(
    State(state): State<AppState>,
    Extension(prpls): Extension<Vec<String>>,
    Path(path_id): Path<String>,
) -> Result<(StatusCode, Json<AccessInvalidateResponse>), (StatusCode, Json<ErrorResponse>)> {

    let caller = auth::ensure_service(&prpls, &state.config.api_service_name)?;

    let report = state.router.revalidate_path(&path_id).await;
    if report.unchecked > 0 {
        warn!("Access of {} member(s) of path {} could not be re-checked", report.unchecked, path_id);
    }
    info!("Access invalidated for path {} by {} ({} revoked)", path_id, caller, report.revoked);

    Ok((
        StatusCode::OK,
        Json(AccessInvalidateResponse {
            path_id,
            revoked_connections: report.revoked as u32,
            unchecked_connections: report.unchecked as u32,
        }),
    ))
}
