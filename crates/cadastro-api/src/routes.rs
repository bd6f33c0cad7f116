//! API route definitions

use crate::auth::{require_auth, require_bearer};
use crate::handlers::{auth, health};
use crate::middleware::fault_injection_middleware;
use crate::state::AppState;
use crate::ApiDoc;
use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Put `router` behind the auth gate
///
/// Resource routers (people, addresses) are mounted through this so that
/// their handlers only ever run with an `AuthenticatedUser` in extensions.
pub fn protected(router: Router<Arc<AppState>>, state: Arc<AppState>) -> Router<Arc<AppState>> {
    router
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            fault_injection_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

/// Routes served under `/api`
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new().route("/auth/login", post(auth::login_handler));

    // Logout only needs a well-formed header so that it stays idempotent
    let logout_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            fault_injection_middleware,
        ))
        .route_layer(middleware::from_fn(require_bearer));

    let protected_routes = protected(
        Router::new()
            .route("/auth/refresh", post(auth::refresh_handler))
            .route("/auth/me", get(auth::me_handler)),
        state,
    );

    Router::new()
        .merge(public_routes)
        .merge(logout_routes)
        .merge(protected_routes)
}

/// Build the complete application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api", api_routes(state.clone()))
        .fallback(crate::error::not_found)
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Empty list or `*` allows any origin
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    layer.allow_methods(Any).allow_headers(Any)
}
