use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{error, info};

use crate::services::auth_service::{get_auth_token, validate_jwt};
use crate::state::AppState;

/// Resolve the bearer token of an HTTP request into principals.
///
/// Service tokens (`type: service`) become `s/<sub>`; user tokens map their
/// `roles` claim to `r/<role>`. The principals are stored as a
/// `Vec<String>` request extension for the handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {

    let token = match get_auth_token(req.headers(), None) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    let secret = match &state.config.jwt_secret {
        Some(secret) => secret,
        None => {
            error!("JWT secret not configured");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let token_data = match validate_jwt(&token, secret) {
        Ok(token_data) => token_data,
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let subject = token_data.claims.get("sub").and_then(|v| v.as_str()).ok_or_else(|| {
        error!("JWT token does not contain 'sub' claim");
        StatusCode::UNAUTHORIZED
    })?;

    let token_type = token_data.claims.get("type").and_then(|v| v.as_str()).unwrap_or("user");
    let prpls = match token_type {
        "service" => {
            info!("Service token validated successfully");
            vec![format!("s/{}", subject)]
        }
        "user" => {
            info!("User token validated successfully");
            let mut prpls = vec![format!("u/{}", subject)];
            if let Some(roles) = token_data.claims.get("roles").and_then(|v| v.as_array()) {
                for role in roles.iter().filter_map(|r| r.as_str()) {
                    let role_prpl = format!("r/{}", role);
                    if !prpls.contains(&role_prpl) {
                        prpls.push(role_prpl);
                    }
                }
            }
            prpls
        }
        other => {
            error!("Invalid token type: {}", other);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    req.extensions_mut().insert(prpls);
    Ok(next.run(req).await)
}
