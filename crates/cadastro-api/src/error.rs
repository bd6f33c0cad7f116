//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error response body shared by every endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable message
    #[schema(example = "Token inválido ou expirado")]
    pub error: String,
}

/// Errors outside the authentication protocol
#[derive(Debug)]
pub enum AppError {
    NotFound,
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Recurso não encontrado"),
            AppError::Internal(detail) => {
                tracing::error!(%detail, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Erro interno do servidor")
            }
        };

        let body = ErrorBody {
            error: message.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<cadastro_core::CadastroError> for AppError {
    fn from(err: cadastro_core::CadastroError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Fallback for unknown routes
pub async fn not_found() -> AppError {
    AppError::NotFound
}
