//! Authentication errors and their HTTP rendering

use crate::error::ErrorBody;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cadastro_core::CadastroError;
use std::fmt;
use thiserror::Error;

/// Why a presented token was rejected
///
/// Callers always see the same message; the reason only reaches the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// Never issued, or purged
    Unknown,
    /// Deactivated by logout or refresh
    Revoked,
    Expired,
    /// The owning identity no longer exists
    OrphanedIdentity,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            InvalidReason::Unknown => "unknown token",
            InvalidReason::Revoked => "token revoked",
            InvalidReason::Expired => "token expired",
            InvalidReason::OrphanedIdentity => "token owner not found",
        };
        f.write_str(reason)
    }
}

/// Errors raised by the auth gate and the login/refresh/logout protocol
///
/// `Display` is the message returned to clients.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token de acesso necessário")]
    MissingCredential,

    #[error("Token malformado")]
    MalformedCredential,

    #[error("Token inválido ou expirado")]
    InvalidCredential(InvalidReason),

    #[error("Username e password são obrigatórios")]
    MissingFields,

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Usuário inativo")]
    InactiveIdentity,

    /// Store or hashing failure; the detail is logged, never returned
    #[error("Erro interno do servidor")]
    InternalFailure(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingFields => StatusCode::BAD_REQUEST,
            AuthError::InternalFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<CadastroError> for AuthError {
    fn from(err: CadastroError) -> Self {
        AuthError::InternalFailure(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::InternalFailure(detail) = &self {
            tracing::error!(error = %detail, "authentication failed internally");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_error_messages_and_status() {
        let cases = vec![
            (AuthError::MissingCredential, 401, "Token de acesso necessário"),
            (AuthError::MalformedCredential, 401, "Token malformado"),
            (
                AuthError::InvalidCredential(InvalidReason::Expired),
                401,
                "Token inválido ou expirado",
            ),
            (AuthError::MissingFields, 400, "Username e password são obrigatórios"),
            (AuthError::InvalidCredentials, 401, "Credenciais inválidas"),
            (AuthError::InactiveIdentity, 401, "Usuário inativo"),
            (
                AuthError::InternalFailure("disk on fire".to_string()),
                500,
                "Erro interno do servidor",
            ),
        ];

        for (err, status, message) in cases {
            let (actual_status, json) = body_of(err).await;
            assert_eq!(actual_status.as_u16(), status, "{message}");
            assert_eq!(json, serde_json::json!({ "error": message }));
        }
    }

    #[tokio::test]
    async fn test_invalid_reasons_are_indistinguishable() {
        let mut bodies = Vec::new();
        for reason in [
            InvalidReason::Unknown,
            InvalidReason::Revoked,
            InvalidReason::Expired,
            InvalidReason::OrphanedIdentity,
        ] {
            bodies.push(body_of(AuthError::InvalidCredential(reason)).await);
        }
        assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_core_errors_become_internal_failures() {
        let err = AuthError::from(CadastroError::DatabaseError("pool closed".to_string()));
        assert!(matches!(err, AuthError::InternalFailure(ref d) if d.contains("pool closed")));
        assert_eq!(err.to_string(), "Erro interno do servidor");
    }
}
