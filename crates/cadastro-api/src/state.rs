//! Application state management

use crate::auth::{AuthGate, AuthService};
use cadastro_core::{
    config::AppConfig, hash_password, BootstrapAdmin, CredentialStore, NewIdentity,
    PasswordConfig, SqliteStore, TokenIssuer,
};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    pub config: AppConfig,
    pub start_time: Instant,
    /// Backing store for identities and tokens
    pub store: SqliteStore,
    pub gate: AuthGate,
    pub auth: AuthService,
}

impl AppState {
    /// Open the configured database, run migrations and seed the bootstrap admin
    pub async fn from_config(config: AppConfig) -> cadastro_core::Result<Self> {
        config.validate()?;
        let store = SqliteStore::connect(&config.database).await?;

        if let Some(admin) = &config.auth.bootstrap_admin {
            bootstrap_admin(&store, admin, &config.auth.password).await?;
        }

        Self::with_store(config, store)
    }

    /// Build state around an already migrated store
    pub fn with_store(config: AppConfig, store: SqliteStore) -> cadastro_core::Result<Self> {
        let shared = Arc::new(store.clone());
        let issuer = TokenIssuer::new(shared.clone(), config.auth.token_lifetime_hours)?;
        let auth = AuthService::new(shared.clone(), shared.clone(), issuer, &config.auth.password)?;

        Ok(Self {
            gate: AuthGate::new(shared.clone(), shared),
            auth,
            store,
            config,
            start_time: Instant::now(),
        })
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Create the configured admin account unless the username already exists
///
/// Returns whether an identity was created.
pub async fn bootstrap_admin(
    store: &dyn CredentialStore,
    admin: &BootstrapAdmin,
    password: &PasswordConfig,
) -> cadastro_core::Result<bool> {
    if store.find_by_username(&admin.username).await?.is_some() {
        tracing::debug!(username = %admin.username, "bootstrap admin already present");
        return Ok(false);
    }

    let identity = store
        .create_identity(NewIdentity {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password_hash: hash_password(&admin.password, password)?,
            active: true,
        })
        .await?;

    tracing::info!(identity_id = identity.id, username = %identity.username, "bootstrap admin created");
    Ok(true)
}
