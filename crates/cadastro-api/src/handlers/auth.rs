//! Authentication API handlers

use crate::audit::AuditContext;
use crate::auth::{
    AuthError, AuthenticatedUser, BearerToken, LoginRequest, LoginResponse, MeResponse,
    MessageResponse, RefreshResponse,
};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Extension, Json,
};
use std::sync::Arc;

/// Login with username and password
///
/// Returns a new opaque bearer token valid for the configured lifetime.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Username or password missing", body = crate::error::ErrorBody),
        (status = 401, description = "Invalid credentials or inactive user", body = crate::error::ErrorBody),
        (status = 500, description = "Internal server error", body = crate::error::ErrorBody),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AuthError> {
    // Any body that is not a JSON object with the expected fields counts as missing fields.
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(%rejection, "login body rejected");
        AuthError::MissingFields
    })?;

    let context = AuditContext::from_headers(&headers);
    let response = state.auth.login(&request, &context).await?;

    Ok(Json(response))
}

/// Exchange the presented token for a new one
///
/// The presented token stops working immediately.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Token refreshed", body = RefreshResponse),
        (status = 401, description = "Missing, malformed, invalid or expired token", body = crate::error::ErrorBody),
        (status = 500, description = "Internal server error", body = crate::error::ErrorBody),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
) -> Result<Json<RefreshResponse>, AuthError> {
    let context = AuditContext::from_headers(&headers);
    let response = state.auth.refresh(&user, &context).await?;

    Ok(Json(response))
}

/// Invalidate the presented token
///
/// Repeating the call with the same token succeeds again.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Missing or malformed Authorization header", body = crate::error::ErrorBody),
        (status = 500, description = "Internal server error", body = crate::error::ErrorBody),
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(BearerToken(token)): Extension<BearerToken>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AuthError> {
    let context = AuditContext::from_headers(&headers);
    let response = state.auth.logout(&token, &context).await?;

    Ok(Json(response))
}

/// Current authenticated user
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Authenticated user profile", body = MeResponse),
        (status = 401, description = "Missing, malformed, invalid or expired token", body = crate::error::ErrorBody),
    )
)]
pub async fn me_handler(Extension(user): Extension<AuthenticatedUser>) -> Json<MeResponse> {
    Json(MeResponse {
        user: user.identity.into(),
    })
}
