//! Bearer token validation
//!
//! The gate turns an `Authorization` header into an [`AuthenticatedUser`] in
//! three steps: extract the bearer value, check it against the token store,
//! then load the owning identity.

use super::error::{AuthError, InvalidReason};
use axum::http::{header, HeaderMap};
use cadastro_core::{AccessToken, CredentialStore, IdentityPublic, TokenStore, TokenValidity};
use serde::Serialize;
use std::sync::Arc;

/// Identity resolved for the current request
///
/// Inserted into request extensions by the auth middleware; extract it in
/// handlers with `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub identity: IdentityPublic,
    /// The bearer value that authenticated this request
    #[serde(skip)]
    pub token: String,
}

/// Well-formed bearer value that has not been checked against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

/// Pull the bearer value out of the `Authorization` header
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredential)?
        .to_str()
        .map_err(|_| AuthError::MalformedCredential)?;

    let (scheme, credential) = value
        .split_once(' ')
        .ok_or(AuthError::MalformedCredential)?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(AuthError::MalformedCredential);
    }

    let credential = credential.trim();
    if credential.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    if credential.contains(char::is_whitespace) {
        return Err(AuthError::MalformedCredential);
    }

    Ok(credential)
}

/// Validates bearer tokens against the stores
#[derive(Clone)]
pub struct AuthGate {
    credentials: Arc<dyn CredentialStore>,
    tokens: Arc<dyn TokenStore>,
}

impl AuthGate {
    pub fn new(credentials: Arc<dyn CredentialStore>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            credentials,
            tokens,
        }
    }

    /// Look the token up and check it is active and unexpired
    pub async fn validate(&self, token: &str) -> Result<AccessToken, AuthError> {
        let record = self
            .tokens
            .find_by_token(token)
            .await?
            .ok_or(AuthError::InvalidCredential(InvalidReason::Unknown))?;

        match record.validity() {
            TokenValidity::Valid => Ok(record),
            TokenValidity::Revoked => Err(AuthError::InvalidCredential(InvalidReason::Revoked)),
            TokenValidity::Expired => Err(AuthError::InvalidCredential(InvalidReason::Expired)),
        }
    }

    /// Validate the token and resolve its owner
    ///
    /// The identity's own `active` flag is not consulted here: deactivating an
    /// account blocks new logins, tokens already issued run until they expire
    /// or are revoked.
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let record = self.validate(token).await?;

        let identity = self
            .credentials
            .find_by_id(record.identity_id)
            .await?
            .ok_or(AuthError::InvalidCredential(InvalidReason::OrphanedIdentity))?;

        Ok(AuthenticatedUser {
            identity: identity.to_public(),
            token: record.token,
        })
    }
}
