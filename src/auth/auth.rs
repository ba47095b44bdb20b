use axum::{http::StatusCode, Json};
use crate::models::ErrorResponse;

const PLATFORM_ADMIN_PRPL: &str = "r/PathColab-Admin";

pub fn is_platform_admin(prpls: &[String]) -> bool {
    prpls.iter().any(|p| p == PLATFORM_ADMIN_PRPL)
}

pub fn is_service(prpls: &[String], service_name: &str) -> bool {
    let service_prpl = format!("s/{}", service_name);
    prpls.iter().any(|p| p == &service_prpl)
}

/// Allow the named service, or a platform admin.
pub fn ensure_service(prpls: &[String], service_name: &str) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    if is_service(prpls, service_name) {
        return Ok(format!("s/{}", service_name));
    }

    if is_platform_admin(prpls) {
        return Ok(PLATFORM_ADMIN_PRPL.to_string());
    }

    let status = StatusCode::FORBIDDEN;
    Err((status, Json(ErrorResponse {
        code: status.as_u16(),
        status: status.to_string(),
        error: format!("Service '{}' access denied", service_name),
    })))
}
