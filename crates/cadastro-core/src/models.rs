//! Identity and access token records
//!
//! These map to the `identities` and `access_tokens` tables created by the
//! embedded migrations.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{CadastroError, Result};

/// A registered account
#[derive(Debug, Clone, FromRow)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string
    pub password_hash: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Convert to the representation returned to clients
    pub fn to_public(&self) -> IdentityPublic {
        IdentityPublic {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            active: self.active,
            created_at: self.created_at,
        }
    }
}

/// Public identity profile (no credential material)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPublic {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(rename = "ativo")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Identity creation payload; the password must already be hashed
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
}

/// Outcome of checking a token against the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidity {
    Valid,
    /// Deactivated by logout or refresh
    Revoked,
    /// Past its expiry, whatever the active flag says
    Expired,
}

/// Opaque bearer credential owned by one identity
#[derive(Debug, Clone, FromRow)]
pub struct AccessToken {
    /// Row identifier, `None` until persisted
    pub id: Option<i64>,
    pub identity_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl AccessToken {
    /// Build an unpersisted, active token valid for `lifetime` from `issued_at`
    ///
    /// Fails when the expiry falls outside the representable date range.
    pub fn new(
        identity_id: i64,
        token: String,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Result<Self> {
        let expires_at = issued_at.checked_add_signed(lifetime).ok_or_else(|| {
            CadastroError::ValidationError(format!("token expiry out of range: {lifetime}"))
        })?;

        Ok(Self {
            id: None,
            identity_id,
            token,
            expires_at,
            active: true,
            created_at: issued_at,
        })
    }

    /// Expiry is checked first: an expired token stays expired even if still active.
    pub fn validity_at(&self, now: DateTime<Utc>) -> TokenValidity {
        if self.expires_at <= now {
            TokenValidity::Expired
        } else if !self.active {
            TokenValidity::Revoked
        } else {
            TokenValidity::Valid
        }
    }

    pub fn validity(&self) -> TokenValidity {
        self.validity_at(Utc::now())
    }

    pub fn is_valid(&self) -> bool {
        self.validity() == TokenValidity::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_issued_at(issued_at: DateTime<Utc>) -> AccessToken {
        AccessToken::new(1, "t".repeat(86), issued_at, Duration::hours(24)).unwrap()
    }

    #[test]
    fn test_new_token_expires_after_lifetime() {
        let now = Utc::now();
        let token = token_issued_at(now);

        assert!(token.id.is_none());
        assert!(token.active);
        assert_eq!(token.created_at, now);
        assert_eq!(token.expires_at - token.created_at, Duration::hours(24));
    }

    #[test]
    fn test_new_token_rejects_unrepresentable_expiry() {
        let result = AccessToken::new(1, "t".repeat(86), Utc::now(), Duration::MAX);
        assert!(matches!(result, Err(CadastroError::ValidationError(_))));
    }

    #[test]
    fn test_token_validity() {
        let now = Utc::now();
        let mut token = token_issued_at(now);

        assert_eq!(token.validity_at(now), TokenValidity::Valid);
        assert!(token.is_valid());

        // Expiry boundary is exclusive
        assert_eq!(token.validity_at(token.expires_at), TokenValidity::Expired);
        assert_eq!(
            token.validity_at(token.expires_at - Duration::seconds(1)),
            TokenValidity::Valid
        );

        token.active = false;
        assert_eq!(token.validity_at(now), TokenValidity::Revoked);
        assert!(!token.is_valid());
    }

    #[test]
    fn test_expired_token_is_expired_even_if_active() {
        let token = token_issued_at(Utc::now() - Duration::hours(48));
        assert!(token.active);
        assert_eq!(token.validity(), TokenValidity::Expired);
    }

    #[test]
    fn test_identity_to_public() {
        let identity = Identity {
            id: 1,
            username: "admin".to_string(),
            email: "admin@api.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            active: true,
            created_at: Utc::now(),
        };

        let public = identity.to_public();
        assert_eq!(public.username, "admin");

        let json = serde_json::to_value(&public).unwrap();
        assert_eq!(json["ativo"], true);
        assert_eq!(json["id"], 1);
        assert!(json.get("password_hash").is_none());
        assert!(!json.to_string().contains("argon2id"));
    }
}
