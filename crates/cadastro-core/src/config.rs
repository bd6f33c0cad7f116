//! Cadastro configuration management
//!
//! Handles configuration from environment variables and TOML files,
//! with defaults suitable for local development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::password::PasswordConfig;

/// Upper bound for `auth.token_lifetime_hours` (ten years)
pub const MAX_TOKEN_LIFETIME_HOURS: i64 = 24 * 365 * 10;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Database connection
    pub database: DatabaseConfig,

    /// Token lifetime, password hashing and bootstrap identity
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Artificial failure injection (off unless explicitly enabled)
    pub fault_injection: FaultInjectionConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_TOKEN_LIFETIME_HOURS).contains(&self.auth.token_lifetime_hours) {
            return Err(ConfigError::InvalidValue {
                key: "auth.token_lifetime_hours".to_string(),
                value: self.auth.token_lifetime_hours.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.fault_injection.error_rate) {
            return Err(ConfigError::InvalidValue {
                key: "fault_injection.error_rate".to_string(),
                value: self.fault_injection.error_rate.to_string(),
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "database.max_connections".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.server.port = parse_value("API_PORT", port)?;
        }
        // CORS origins from environment variable (comma-separated)
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Database
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_value("DATABASE_MAX_CONNECTIONS", max)?;
        }

        // Auth
        if let Some(hours) = lookup("TOKEN_LIFETIME_HOURS") {
            self.auth.token_lifetime_hours = parse_value("TOKEN_LIFETIME_HOURS", hours)?;
        }
        if let (Some(username), Some(password)) = (
            lookup("BOOTSTRAP_ADMIN_USERNAME"),
            lookup("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            let email = lookup("BOOTSTRAP_ADMIN_EMAIL")
                .unwrap_or_else(|| format!("{username}@localhost"));
            self.auth.bootstrap_admin = Some(BootstrapAdmin {
                username,
                email,
                password,
            });
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.json_format = match format.to_lowercase().as_str() {
                "json" => true,
                "pretty" | "text" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "LOG_FORMAT".to_string(),
                        value: format,
                    })
                }
            };
        }

        // Fault injection
        if let Some(rate) = lookup("FAULT_INJECTION_RATE") {
            self.fault_injection.error_rate = parse_value("FAULT_INJECTION_RATE", rate)?;
            self.fault_injection.enabled = self.fault_injection.error_rate > 0.0;
        }

        self.validate()
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS; empty means any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: vec![],
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL (`sqlite::memory:` for an ephemeral store)
    pub url: String,

    /// Connection pool size (forced to 1 for in-memory databases)
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://cadastro.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Whether the URL points at a private in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of issued access tokens, in hours
    pub token_lifetime_hours: i64,

    /// Argon2 parameters for new password hashes
    pub password: PasswordConfig,

    /// Identity created at startup when missing
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_lifetime_hours: 24,
            password: PasswordConfig::default(),
            bootstrap_admin: None,
        }
    }
}

/// Credentials for the identity ensured at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Artificial 500 responses on protected routes, for client resilience testing
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FaultInjectionConfig {
    pub enabled: bool,

    /// Probability in `[0, 1]` that a request fails
    pub error_rate: f64,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn apply(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = AppConfig::default();
        config.apply_env(|key| vars.get(key).cloned())?;
        Ok(config)
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.auth.token_lifetime_hours, 24);
        assert!(config.auth.bootstrap_admin.is_none());
        assert!(!config.fault_injection.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = apply(&[
            ("API_PORT", "8081"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("TOKEN_LIFETIME_HOURS", "2"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(config.server.port, 8081);
        assert!(config.database.is_in_memory());
        assert_eq!(config.auth.token_lifetime_hours, 2);
        assert_eq!(
            config.server.cors_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_bootstrap_admin_needs_username_and_password() {
        let config = apply(&[("BOOTSTRAP_ADMIN_USERNAME", "admin")]).unwrap();
        assert!(config.auth.bootstrap_admin.is_none());

        let config = apply(&[
            ("BOOTSTRAP_ADMIN_USERNAME", "admin"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "123456"),
        ])
        .unwrap();
        let admin = config.auth.bootstrap_admin.unwrap();
        assert_eq!(admin.username, "admin");
        assert_eq!(admin.email, "admin@localhost");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            apply(&[("API_PORT", "not-a-port")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(apply(&[("TOKEN_LIFETIME_HOURS", "0")]).is_err());
        assert!(apply(&[("TOKEN_LIFETIME_HOURS", "10000000000")]).is_err());
        assert!(apply(&[("TOKEN_LIFETIME_HOURS", "87600")]).is_ok());
        assert!(apply(&[("FAULT_INJECTION_RATE", "1.5")]).is_err());
        assert!(apply(&[("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn test_token_lifetime_is_bounded() {
        let mut config = AppConfig::default();
        config.auth.token_lifetime_hours = 10_000_000_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.auth.token_lifetime_hours = MAX_TOKEN_LIFETIME_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fault_rate_enables_injection() {
        let config = apply(&[("FAULT_INJECTION_RATE", "0.03")]).unwrap();
        assert!(config.fault_injection.enabled);
        assert!((config.fault_injection.error_rate - 0.03).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [auth]
            token_lifetime_hours = 12

            [auth.bootstrap_admin]
            username = "admin"
            email = "admin@api.com"
            password = "123456"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.token_lifetime_hours, 12);
        assert_eq!(config.auth.bootstrap_admin.unwrap().email, "admin@api.com");
    }
}
