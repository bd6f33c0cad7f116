//! Cadastro API - REST server
//!
//! Bearer-token authentication for the people and address registry: login,
//! token refresh, logout and the gate that protects every other route.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use routes::{api_routes, create_router, protected};
pub use state::AppState;

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// OpenAPI document served at `/api-docs/openapi.json`
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::login_handler,
        handlers::auth::refresh_handler,
        handlers::auth::logout_handler,
        handlers::auth::me_handler,
        handlers::health::health_check,
        handlers::health::readiness_check,
    ),
    components(schemas(
        auth::LoginRequest,
        auth::LoginResponse,
        auth::RefreshResponse,
        auth::MessageResponse,
        auth::MeResponse,
        auth::UserInfo,
        error::ErrorBody,
        handlers::health::HealthResponse,
        handlers::health::ReadinessResponse,
        handlers::health::ReadinessChecks,
    )),
    modifiers(&BearerSecurity),
    tags(
        (name = "auth", description = "Login, token refresh and logout"),
        (name = "health", description = "Liveness and readiness probes"),
    )
)]
pub struct ApiDoc;

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
