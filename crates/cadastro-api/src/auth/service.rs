//! Authentication service layer
//!
//! Login, token refresh and logout on top of the credential and token stores.
//! Every outcome is written to the audit log.

use super::error::AuthError;
use super::gate::AuthenticatedUser;
use super::models::{LoginRequest, LoginResponse, MessageResponse, RefreshResponse};
use crate::audit::{audit_log, AuditContext, AuditEvent};
use cadastro_core::{
    hash_password, verify_password, CadastroError, CredentialStore, Identity, PasswordConfig,
    TokenIssuer, TokenStore,
};
use std::sync::Arc;

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    tokens: Arc<dyn TokenStore>,
    issuer: TokenIssuer,
    /// Verified in place of a real digest when the username is unknown
    dummy_hash: Arc<str>,
}

impl AuthService {
    /// `password` sets the cost of the stand-in digest checked for unknown
    /// usernames, so both failed-login paths run one Argon2 verification.
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
        issuer: TokenIssuer,
        password: &PasswordConfig,
    ) -> cadastro_core::Result<Self> {
        let dummy_hash = hash_password("cadastro-unknown-identity", password)?;

        Ok(Self {
            credentials,
            tokens,
            issuer,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Exchange username and password for a new access token
    ///
    /// Unknown usernames and wrong passwords fail identically. The active flag
    /// is only checked once the password has matched.
    pub async fn login(
        &self,
        request: &LoginRequest,
        context: &AuditContext,
    ) -> Result<LoginResponse, AuthError> {
        let (username, password) = request.credentials().ok_or(AuthError::MissingFields)?;

        let identity = self
            .credentials
            .find_by_username(username)
            .await
            .map_err(|e| internal_failure("login", context, e))?;

        let Some(identity) = identity else {
            let dummy_hash = self.dummy_hash.clone();
            let password = password.to_string();
            verify_blocking(context, move || Ok(verify_password(&password, &dummy_hash)?))
                .await?;
            login_failure(username, "unknown username", context);
            return Err(AuthError::InvalidCredentials);
        };

        if !self.check_password(&identity, password, context).await? {
            login_failure(username, "wrong password", context);
            return Err(AuthError::InvalidCredentials);
        }

        if !identity.active {
            login_failure(username, "identity inactive", context);
            return Err(AuthError::InactiveIdentity);
        }

        let token = self
            .issuer
            .issue(identity.id)
            .await
            .map_err(|e| internal_failure("login", context, e))?;

        audit_log(&AuditEvent::LoginSuccess {
            identity_id: identity.id,
            username: identity.username.clone(),
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
        });

        Ok(LoginResponse {
            message: "Login realizado com sucesso".to_string(),
            token: token.token,
            expires_at: token.expires_at,
            user: identity.to_public().into(),
        })
    }

    /// Replace the presented token with a fresh one
    ///
    /// The new token is inserted and the old one deactivated in a single
    /// transaction.
    pub async fn refresh(
        &self,
        user: &AuthenticatedUser,
        context: &AuditContext,
    ) -> Result<RefreshResponse, AuthError> {
        let replacement = self
            .issuer
            .mint(user.identity.id)
            .map_err(|e| internal_failure("refresh", context, e))?;

        let token = self
            .tokens
            .rotate(&user.token, replacement)
            .await
            .map_err(|e| internal_failure("refresh", context, e))?;

        audit_log(&AuditEvent::TokenRefresh {
            identity_id: user.identity.id,
            username: user.identity.username.clone(),
            ip_address: context.ip_address.clone(),
        });

        Ok(RefreshResponse {
            message: "Token renovado com sucesso".to_string(),
            token: token.token,
            expires_at: token.expires_at,
        })
    }

    /// Deactivate the presented token
    ///
    /// Idempotent: unknown and already inactive tokens succeed too.
    pub async fn logout(
        &self,
        token: &str,
        context: &AuditContext,
    ) -> Result<MessageResponse, AuthError> {
        let deactivated = self
            .tokens
            .deactivate(token)
            .await
            .map_err(|e| internal_failure("logout", context, e))?;

        audit_log(&AuditEvent::Logout {
            deactivated,
            ip_address: context.ip_address.clone(),
        });

        Ok(MessageResponse {
            message: "Logout realizado com sucesso".to_string(),
        })
    }

    async fn check_password(
        &self,
        identity: &Identity,
        password: &str,
        context: &AuditContext,
    ) -> Result<bool, AuthError> {
        let credentials = self.credentials.clone();
        let identity = identity.clone();
        let password = password.to_string();

        verify_blocking(context, move || credentials.verify_password(&identity, &password)).await
    }
}

/// Runs Argon2 verification on the blocking pool
async fn verify_blocking<F>(context: &AuditContext, verify: F) -> Result<bool, AuthError>
where
    F: FnOnce() -> cadastro_core::Result<bool> + Send + 'static,
{
    tokio::task::spawn_blocking(verify)
        .await
        .map_err(|e| internal_failure("login", context, CadastroError::Other(e.into())))?
        .map_err(|e| internal_failure("login", context, e))
}

fn login_failure(username: &str, reason: &str, context: &AuditContext) {
    audit_log(&AuditEvent::LoginFailure {
        username: username.to_string(),
        reason: reason.to_string(),
        ip_address: context.ip_address.clone(),
        user_agent: context.user_agent.clone(),
    });
}

fn internal_failure(operation: &str, context: &AuditContext, err: CadastroError) -> AuthError {
    audit_log(&AuditEvent::InternalFailure {
        operation: operation.to_string(),
        ip_address: context.ip_address.clone(),
    });
    AuthError::from(err)
}
