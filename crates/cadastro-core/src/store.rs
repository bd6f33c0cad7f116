//! SQLite credential and token stores
//!
//! Both stores are traits so the HTTP layer can be exercised against doubles;
//! [`SqliteStore`] implements them over a single SQLx pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteExecutor;
use std::str::FromStr;

use crate::{
    config::DatabaseConfig,
    models::{AccessToken, Identity, NewIdentity},
    password, CadastroError, Result,
};

const IDENTITY_COLUMNS: &str = "id, username, email, password_hash, active, created_at";
const TOKEN_COLUMNS: &str = "id, identity_id, token, expires_at, active, created_at";

/// Read access to identities plus the collaborator operations used by
/// bootstrap and the operator CLI
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>>;

    async fn list_identities(&self) -> Result<Vec<Identity>>;

    /// Fails with [`CadastroError::Duplicate`] when username or email is taken
    async fn create_identity(&self, identity: NewIdentity) -> Result<Identity>;

    /// Returns `false` when no identity has this id
    async fn set_active(&self, id: i64, active: bool) -> Result<bool>;

    /// Deletes the identity and every token it owns
    async fn delete_identity(&self, id: i64) -> Result<bool>;

    /// Check `plaintext` against the identity's stored digest
    fn verify_password(&self, identity: &Identity, plaintext: &str) -> Result<bool> {
        Ok(password::verify_password(plaintext, &identity.password_hash)?)
    }
}

/// Persistence for issued access tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn find_by_token(&self, token: &str) -> Result<Option<AccessToken>>;

    /// Insert when `token.id` is `None`, otherwise write the active flag.
    /// A deactivated token is never reactivated.
    async fn persist(&self, token: AccessToken) -> Result<AccessToken>;

    /// Idempotent; returns whether this call flipped the flag
    async fn deactivate(&self, token: &str) -> Result<bool>;

    /// Insert `replacement` and deactivate `current` as one unit
    async fn rotate(&self, current: &str, replacement: AccessToken) -> Result<AccessToken>;

    async fn list_for_identity(&self, identity_id: i64) -> Result<Vec<AccessToken>>;

    /// Delete tokens whose expiry is at or before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// SQLite-backed implementation of both stores
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the configured database and apply pending migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| CadastroError::DatabaseError(format!("Invalid database URL: {e}")))?
            .foreign_keys(true);

        // Every connection to `:memory:` is a separate database, so keep exactly one alive.
        let pool_options = if config.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| CadastroError::DatabaseError(format!("SQLite connection failed: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Fresh private database, mostly for tests
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
    }

    /// Create from an existing pool (migrations are not run)
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn find_token_by_id(&self, id: i64) -> Result<Option<AccessToken>> {
        let query = format!("SELECT {TOKEN_COLUMNS} FROM access_tokens WHERE id = ?");
        let token = sqlx::query_as::<_, AccessToken>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(token)
    }
}

async fn insert_token<'e, E>(executor: E, token: &AccessToken) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "INSERT INTO access_tokens (identity_id, token, expires_at, active, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(token.identity_id)
    .bind(&token.token)
    .bind(token.expires_at)
    .bind(token.active)
    .bind(token.created_at)
    .execute(executor)
    .await
    .map_err(|e| insert_error(e, "access token"))?;

    Ok(result.last_insert_rowid())
}

fn insert_error(err: sqlx::Error, what: &str) -> CadastroError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            CadastroError::Duplicate(format!("{what}: {}", db.message()))
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            CadastroError::NotFound(format!("owner of {what}"))
        }
        _ => CadastroError::DatabaseError(format!("Failed to insert {what}: {err}")),
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE username = ?");
        sqlx::query_as::<_, Identity>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CadastroError::DatabaseError(format!("Failed to fetch identity: {e}")))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = ?");
        sqlx::query_as::<_, Identity>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CadastroError::DatabaseError(format!("Failed to fetch identity: {e}")))
    }

    async fn list_identities(&self) -> Result<Vec<Identity>> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM identities ORDER BY id");
        let identities = sqlx::query_as::<_, Identity>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(identities)
    }

    async fn create_identity(&self, identity: NewIdentity) -> Result<Identity> {
        if identity.username.trim().is_empty() {
            return Err(CadastroError::ValidationError(
                "username must not be empty".to_string(),
            ));
        }
        if !identity.email.contains('@') {
            return Err(CadastroError::ValidationError(format!(
                "invalid email address: {}",
                identity.email
            )));
        }

        let created_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO identities (username, email, password_hash, active, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&identity.username)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(identity.active)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "identity"))?
        .last_insert_rowid();

        Ok(Identity {
            id,
            username: identity.username,
            email: identity.email,
            password_hash: identity.password_hash,
            active: identity.active,
            created_at,
        })
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE identities SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_identity(&self, id: i64) -> Result<bool> {
        // Tokens go with the identity through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM identities WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<AccessToken>> {
        let query = format!("SELECT {TOKEN_COLUMNS} FROM access_tokens WHERE token = ?");
        sqlx::query_as::<_, AccessToken>(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CadastroError::DatabaseError(format!("Failed to fetch access token: {e}")))
    }

    async fn persist(&self, token: AccessToken) -> Result<AccessToken> {
        let Some(id) = token.id else {
            let id = insert_token(&self.pool, &token).await?;
            return Ok(AccessToken {
                id: Some(id),
                ..token
            });
        };

        let current = self
            .find_token_by_id(id)
            .await?
            .ok_or_else(|| CadastroError::NotFound(format!("access token {id}")))?;

        if token.active && !current.active {
            return Err(CadastroError::ValidationError(
                "a deactivated token cannot be reactivated".to_string(),
            ));
        }

        if !token.active && current.active {
            sqlx::query("UPDATE access_tokens SET active = 0 WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
        }

        Ok(AccessToken {
            active: token.active,
            ..current
        })
    }

    async fn deactivate(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE access_tokens SET active = 0 WHERE token = ? AND active = 1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                CadastroError::DatabaseError(format!("Failed to deactivate access token: {e}"))
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn rotate(&self, current: &str, replacement: AccessToken) -> Result<AccessToken> {
        let mut tx = self.pool.begin().await?;

        // The replacement row goes in first; nothing is visible until commit.
        let id = insert_token(&mut *tx, &replacement).await?;

        sqlx::query("UPDATE access_tokens SET active = 0 WHERE token = ? AND active = 1")
            .bind(current)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(AccessToken {
            id: Some(id),
            ..replacement
        })
    }

    async fn list_for_identity(&self, identity_id: i64) -> Result<Vec<AccessToken>> {
        let query = format!(
            "SELECT {TOKEN_COLUMNS} FROM access_tokens WHERE identity_id = ? ORDER BY id DESC"
        );
        let tokens = sqlx::query_as::<_, AccessToken>(&query)
            .bind(identity_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(tokens)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        // RFC 3339 strings from the same encoder order like the instants they encode.
        let result = sqlx::query("DELETE FROM access_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
