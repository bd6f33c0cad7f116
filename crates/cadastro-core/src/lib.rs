//! Cadastro Core - Domain models, storage and shared types
//!
//! This crate defines the pieces of the authentication subsystem that do not
//! depend on HTTP:
//! - Identity and access token models
//! - Credential and token stores (SQLite via SQLx)
//! - Token issuance
//! - Password hashing
//! - Configuration management
//! - Common error types

pub mod config;
pub mod models;
pub mod password;
pub mod store;
pub mod token;

pub use config::{AppConfig, AuthConfig, BootstrapAdmin, ConfigError, DatabaseConfig};
pub use models::{AccessToken, Identity, IdentityPublic, NewIdentity, TokenValidity};
pub use password::{hash_password, verify_password, PasswordConfig, PasswordError};
pub use store::{CredentialStore, SqliteStore, TokenStore};
pub use token::{generate_token_value, TokenIssuer, TOKEN_BYTES};

use thiserror::Error;

/// Core error types for Cadastro operations
#[derive(Error, Debug)]
pub enum CadastroError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for CadastroError {
    fn from(err: sqlx::Error) -> Self {
        CadastroError::DatabaseError(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for CadastroError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CadastroError::DatabaseError(format!("migration failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, CadastroError>;
