//! Authentication middleware for protecting routes
//!
//! ```ignore
//! use axum::{middleware, routing::get, Router};
//! use cadastro_api::auth::middleware::require_auth;
//!
//! let protected = Router::new()
//!     .route("/api/pessoas", get(list_pessoas))
//!     .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));
//! ```
//!
//! Handlers then take `Extension<AuthenticatedUser>`.

use super::error::AuthError;
use super::gate::{extract_bearer, BearerToken};
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Require a valid, active, unexpired bearer token
///
/// On success the resolved [`AuthenticatedUser`](super::AuthenticatedUser) is
/// added to the request extensions; otherwise the request never reaches the
/// handler.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_bearer(request.headers())?.to_string();

    let user = match state.gate.authenticate(&token).await {
        Ok(user) => user,
        Err(err) => {
            let context = AuditContext::from_headers(request.headers());
            match &err {
                AuthError::InvalidCredential(reason) => audit_log(&AuditEvent::InvalidToken {
                    ip_address: context.ip_address,
                    user_agent: context.user_agent,
                    reason: reason.to_string(),
                }),
                _ => audit_log(&AuditEvent::InternalFailure {
                    operation: "authenticate".to_string(),
                    ip_address: context.ip_address,
                }),
            }
            return Err(err);
        }
    };

    tracing::debug!(identity_id = user.identity.id, "request authenticated");
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Require a well-formed bearer header without consulting the store
///
/// Used where an already invalid token must still be accepted (logout). The
/// raw value is added to the request extensions as [`BearerToken`].
pub async fn require_bearer(mut request: Request, next: Next) -> Result<Response, AuthError> {
    let token = extract_bearer(request.headers())?.to_string();
    request.extensions_mut().insert(BearerToken(token));

    Ok(next.run(request).await)
}
