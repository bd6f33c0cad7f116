//! Cadastro CLI - Command-line interface
//!
//! Works directly on the configured database; the API server does not need
//! to be running.
//!
//! Usage:
//!   cadastro user create <username> <email> --password <password>
//!   cadastro user list
//!   cadastro user deactivate <username> [--revoke-tokens]
//!   cadastro token list <username>
//!   cadastro token purge-expired

use anyhow::{bail, Context};
use cadastro_core::{
    config::AppConfig, hash_password, CredentialStore, Identity, NewIdentity, SqliteStore,
    TokenStore,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadastro")]
#[command(about = "Cadastro identity and token administration")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage identities
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage access tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new identity
    Create {
        username: String,
        email: String,
        #[arg(long)]
        password: String,
        /// Create the identity inactive
        #[arg(long)]
        inactive: bool,
    },
    /// List all identities
    List,
    /// Allow the identity to log in again
    Activate { username: String },
    /// Block new logins for the identity
    Deactivate {
        username: String,
        /// Also deactivate every token the identity holds
        #[arg(long)]
        revoke_tokens: bool,
    },
    /// Delete the identity and all its tokens
    Delete { username: String },
}

#[derive(Subcommand)]
enum TokenAction {
    /// List the tokens held by an identity
    List { username: String },
    /// Deactivate a token
    Revoke { token: String },
    /// Delete tokens past their expiry
    PurgeExpired,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.logging.level))),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = SqliteStore::connect(&config.database)
        .await
        .with_context(|| format!("failed to open database {}", config.database.url))?;

    let output = execute(cli.command, &store, &config).await;
    store.close().await;

    println!("{}", output?);
    Ok(())
}

async fn execute(
    command: Commands,
    store: &SqliteStore,
    config: &AppConfig,
) -> anyhow::Result<String> {
    match command {
        Commands::User { action } => user_command(action, store, config).await,
        Commands::Token { action } => token_command(action, store).await,
    }
}

async fn user_command(
    action: UserAction,
    store: &SqliteStore,
    config: &AppConfig,
) -> anyhow::Result<String> {
    match action {
        UserAction::Create {
            username,
            email,
            password,
            inactive,
        } => {
            if password.is_empty() {
                bail!("password must not be empty");
            }
            let identity = store
                .create_identity(NewIdentity {
                    username,
                    email,
                    password_hash: hash_password(&password, &config.auth.password)?,
                    active: !inactive,
                })
                .await?;
            tracing::info!(identity_id = identity.id, "identity created");
            Ok(format!("Created identity {} ({})", identity.username, identity.id))
        }
        UserAction::List => {
            let identities = store.list_identities().await?;
            if identities.is_empty() {
                return Ok("No identities".to_string());
            }
            let lines: Vec<String> = identities
                .iter()
                .map(|i| {
                    format!(
                        "{:>5}  {:<20} {:<30} {}",
                        i.id,
                        i.username,
                        i.email,
                        if i.active { "active" } else { "inactive" }
                    )
                })
                .collect();
            Ok(lines.join("\n"))
        }
        UserAction::Activate { username } => {
            let identity = find_identity(store, &username).await?;
            store.set_active(identity.id, true).await?;
            Ok(format!("Activated {username}"))
        }
        UserAction::Deactivate {
            username,
            revoke_tokens,
        } => {
            let identity = find_identity(store, &username).await?;
            store.set_active(identity.id, false).await?;

            let mut revoked = 0;
            if revoke_tokens {
                for token in store.list_for_identity(identity.id).await? {
                    if store.deactivate(&token.token).await? {
                        revoked += 1;
                    }
                }
            }
            Ok(format!("Deactivated {username} ({revoked} tokens revoked)"))
        }
        UserAction::Delete { username } => {
            let identity = find_identity(store, &username).await?;
            store.delete_identity(identity.id).await?;
            Ok(format!("Deleted {username}"))
        }
    }
}

async fn token_command(action: TokenAction, store: &SqliteStore) -> anyhow::Result<String> {
    match action {
        TokenAction::List { username } => {
            let identity = find_identity(store, &username).await?;
            let tokens = store.list_for_identity(identity.id).await?;
            if tokens.is_empty() {
                return Ok(format!("{username} holds no tokens"));
            }
            let now = Utc::now();
            let lines: Vec<String> = tokens
                .iter()
                .map(|t| {
                    format!(
                        "{}…  created {}  expires {}  {:?}",
                        t.token.chars().take(8).collect::<String>(),
                        t.created_at.to_rfc3339(),
                        t.expires_at.to_rfc3339(),
                        t.validity_at(now)
                    )
                })
                .collect();
            Ok(lines.join("\n"))
        }
        TokenAction::Revoke { token } => {
            if store.find_by_token(&token).await?.is_none() {
                bail!("no such token");
            }
            if store.deactivate(&token).await? {
                Ok("Token revoked".to_string())
            } else {
                Ok("Token was already inactive".to_string())
            }
        }
        TokenAction::PurgeExpired => {
            let removed = store.purge_expired(Utc::now()).await?;
            Ok(format!("Removed {removed} expired tokens"))
        }
    }
}

async fn find_identity(store: &SqliteStore, username: &str) -> anyhow::Result<Identity> {
    store
        .find_by_username(username)
        .await?
        .with_context(|| format!("no identity named {username}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadastro_core::{generate_token_value, AccessToken, PasswordConfig};
    use chrono::Duration;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.password = PasswordConfig::lightweight();
        config
    }

    async fn run(store: &SqliteStore, args: &[&str]) -> anyhow::Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("cadastro").chain(args.iter().copied()))?;
        execute(cli.command, store, &config()).await
    }

    #[tokio::test]
    async fn test_user_lifecycle() {
        let store = SqliteStore::in_memory().await.unwrap();

        run(&store, &["user", "create", "maria", "maria@api.com", "--password", "s3nha"])
            .await
            .unwrap();
        let listed = run(&store, &["user", "list"]).await.unwrap();
        assert!(listed.contains("maria"));
        assert!(listed.contains("active"));

        run(&store, &["user", "deactivate", "maria"]).await.unwrap();
        assert!(!store.find_by_username("maria").await.unwrap().unwrap().active);

        run(&store, &["user", "activate", "maria"]).await.unwrap();
        assert!(store.find_by_username("maria").await.unwrap().unwrap().active);

        run(&store, &["user", "delete", "maria"]).await.unwrap();
        assert!(store.find_by_username("maria").await.unwrap().is_none());
        assert!(run(&store, &["user", "delete", "maria"]).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_user_fails() {
        let store = SqliteStore::in_memory().await.unwrap();
        let args = ["user", "create", "admin", "admin@api.com", "--password", "123456"];

        run(&store, &args).await.unwrap();
        assert!(run(&store, &args).await.is_err());
    }

    #[tokio::test]
    async fn test_deactivate_can_revoke_tokens() {
        let store = SqliteStore::in_memory().await.unwrap();
        run(&store, &["user", "create", "admin", "admin@api.com", "--password", "123456"])
            .await
            .unwrap();
        let admin = store.find_by_username("admin").await.unwrap().unwrap();
        let token = store
            .persist(AccessToken::new(
                admin.id,
                generate_token_value(),
                Utc::now(),
                Duration::hours(24),
            ).unwrap())
            .await
            .unwrap();

        let output = run(&store, &["user", "deactivate", "admin", "--revoke-tokens"])
            .await
            .unwrap();
        assert!(output.contains("1 tokens revoked"));
        assert!(!store.find_by_token(&token.token).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_token_commands() {
        let store = SqliteStore::in_memory().await.unwrap();
        run(&store, &["user", "create", "admin", "admin@api.com", "--password", "123456"])
            .await
            .unwrap();
        let admin = store.find_by_username("admin").await.unwrap().unwrap();
        let live = store
            .persist(AccessToken::new(
                admin.id,
                generate_token_value(),
                Utc::now(),
                Duration::hours(24),
            ).unwrap())
            .await
            .unwrap();
        store
            .persist(AccessToken::new(
                admin.id,
                generate_token_value(),
                Utc::now() - Duration::hours(48),
                Duration::hours(24),
            ).unwrap())
            .await
            .unwrap();

        let listed = run(&store, &["token", "list", "admin"]).await.unwrap();
        assert_eq!(listed.lines().count(), 2);
        assert!(!listed.contains(&live.token));

        let purged = run(&store, &["token", "purge-expired"]).await.unwrap();
        assert_eq!(purged, "Removed 1 expired tokens");

        assert_eq!(
            run(&store, &["token", "revoke", live.token.as_str()]).await.unwrap(),
            "Token revoked"
        );
        assert_eq!(
            run(&store, &["token", "revoke", live.token.as_str()]).await.unwrap(),
            "Token was already inactive"
        );
        assert!(run(&store, &["token", "revoke", "never-issued"]).await.is_err());
    }
}
