//! Request and response bodies for the auth endpoints

use cadastro_core::IdentityPublic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Login credentials
///
/// Both fields are optional at the type level so that absent and empty
/// values share one error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "admin")]
    pub username: Option<String>,
    #[schema(example = "123456")]
    pub password: Option<String>,
}

impl LoginRequest {
    /// Both fields present and non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some((username, password))
            }
            _ => None,
        }
    }
}

/// Public identity as rendered in responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub ativo: bool,
    pub created_at: DateTime<Utc>,
}

impl From<IdentityPublic> for UserInfo {
    fn from(identity: IdentityPublic) -> Self {
        Self {
            id: identity.id,
            username: identity.username,
            email: identity.email,
            ativo: identity.active,
            created_at: identity.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    #[schema(example = "Login realizado com sucesso")]
    pub message: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    #[schema(example = "Token renovado com sucesso")]
    pub message: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user: UserInfo,
}
