use crate::{
    handlers::{access_invalidate, diagnostics, health_check, ready_check},
    routes::auth_middleware::auth_middleware,
    state::AppState,
};
use axum::{middleware, routing::{get, post}, Router};

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/paths/:path_id/access/invalidate", post(access_invalidate))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware)); // Applies to all routes added above

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .merge(protected)
}
