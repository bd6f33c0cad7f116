//! Access token issuance
//!
//! Tokens are opaque: 64 bytes from the operating system CSPRNG, encoded as
//! unpadded URL-safe base64 (86 characters). Nothing about the owner or the
//! expiry can be read from the string itself; the store is the source of truth.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;

use crate::{config::MAX_TOKEN_LIFETIME_HOURS, AccessToken, CadastroError, Result, TokenStore};

/// Number of random bytes behind each token string
pub const TOKEN_BYTES: usize = 64;

/// Generate a fresh, unguessable token string
pub fn generate_token_value() -> String {
    let mut bytes = [0_u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Mints tokens with a fixed lifetime and persists them
#[derive(Clone)]
pub struct TokenIssuer {
    tokens: Arc<dyn TokenStore>,
    lifetime: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Create an issuer whose tokens live `lifetime_hours` hours
    ///
    /// The lifetime must lie in `1..=MAX_TOKEN_LIFETIME_HOURS`.
    pub fn new(tokens: Arc<dyn TokenStore>, lifetime_hours: i64) -> Result<Self> {
        let lifetime = Some(lifetime_hours)
            .filter(|hours| (1..=MAX_TOKEN_LIFETIME_HOURS).contains(hours))
            .and_then(Duration::try_hours)
            .filter(|lifetime| Utc::now().checked_add_signed(*lifetime).is_some())
            .ok_or_else(|| {
                CadastroError::ValidationError(format!(
                    "token lifetime must be between 1 and {MAX_TOKEN_LIFETIME_HOURS} hours, got {lifetime_hours}"
                ))
            })?;

        Ok(Self { tokens, lifetime })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Build a new token for `identity_id` without persisting it
    pub fn mint(&self, identity_id: i64) -> Result<AccessToken> {
        AccessToken::new(identity_id, generate_token_value(), Utc::now(), self.lifetime)
    }

    /// Mint and persist a new token for `identity_id`
    pub async fn issue(&self, identity_id: i64) -> Result<AccessToken> {
        let token = self.tokens.persist(self.mint(identity_id)?).await?;
        tracing::debug!(identity_id, expires_at = %token.expires_at, "access token issued");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::NewIdentity, CredentialStore, PasswordConfig, SqliteStore};
    use std::collections::HashSet;

    async fn issuer_with_identity() -> (TokenIssuer, Arc<SqliteStore>, i64) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let hash = crate::hash_password("123456", &PasswordConfig::lightweight()).unwrap();
        let identity = store
            .create_identity(NewIdentity {
                username: "admin".to_string(),
                email: "admin@api.com".to_string(),
                password_hash: hash,
                active: true,
            })
            .await
            .unwrap();
        let issuer = TokenIssuer::new(store.clone(), 24).unwrap();
        (issuer, store, identity.id)
    }

    #[test]
    fn test_token_value_shape() {
        let value = generate_token_value();
        assert_eq!(value.len(), 86);
        assert!(value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_token_values_do_not_repeat() {
        let values: HashSet<String> = (0..1000).map(|_| generate_token_value()).collect();
        assert_eq!(values.len(), 1000);
    }

    #[test]
    fn test_lifetime_must_be_in_range() {
        let store: Arc<dyn TokenStore> = Arc::new(crate::store::tests::UnreachableTokenStore);
        assert!(TokenIssuer::new(store.clone(), 0).is_err());
        assert!(TokenIssuer::new(store.clone(), -3).is_err());
        assert!(TokenIssuer::new(store.clone(), i64::MAX).is_err());
        assert!(TokenIssuer::new(store.clone(), 10_000_000_000).is_err());
        assert!(TokenIssuer::new(store.clone(), MAX_TOKEN_LIFETIME_HOURS + 1).is_err());
        assert!(TokenIssuer::new(store.clone(), MAX_TOKEN_LIFETIME_HOURS)
            .unwrap()
            .mint(1)
            .is_ok());
        assert_eq!(
            TokenIssuer::new(store, 24).unwrap().lifetime(),
            Duration::hours(24)
        );
    }

    #[tokio::test]
    async fn test_issue_persists_token() {
        let (issuer, store, identity_id) = issuer_with_identity().await;

        let token = issuer.issue(identity_id).await.unwrap();
        assert!(token.id.is_some());
        assert!(token.active);
        assert_eq!(token.expires_at - token.created_at, Duration::hours(24));

        let found = store.find_by_token(&token.token).await.unwrap().unwrap();
        assert_eq!(found.id, token.id);
        assert_eq!(found.identity_id, identity_id);
        assert_eq!(found.expires_at, token.expires_at);
    }

    #[tokio::test]
    async fn test_mint_does_not_persist() {
        let (issuer, store, identity_id) = issuer_with_identity().await;

        let token = issuer.mint(identity_id).unwrap();
        assert!(token.id.is_none());
        assert!(store.find_by_token(&token.token).await.unwrap().is_none());
    }
}
