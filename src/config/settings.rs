//! # Configuration Settings
//!
//! Defines the configuration structure for pgrotate.

use crate::errors::{Result, RotationError};
use crate::secrets::RotationSchedule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// Prefix shared by every environment variable read here
pub const ENV_PREFIX: &str = "PGROTATE_";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Password policy and step behaviour
    #[validate(nested)]
    pub rotation: RotationConfig,

    /// Database connection bounds
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Secret store backend selection
    #[validate(nested)]
    pub secret_store: SecretStoreConfig,

    /// Logging configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load every section from `PGROTATE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            rotation: RotationConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            secret_store: SecretStoreConfig::from_env()?,
            observability: ObservabilityConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(RotationError::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if let Some(admin) = &self.rotation.admin_secret_id {
            if admin.trim().is_empty() {
                return Err(RotationError::config("Admin secret id cannot be blank"));
            }
        }

        if let Some(endpoint) = &self.secret_store.endpoint_url {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(RotationError::config(
                    "Secret store endpoint URL must start with 'http://' or 'https://'",
                ));
            }
        }

        if self.secret_store.backend == SecretStoreBackend::Aws && self.secret_store.seed_file.is_some()
        {
            return Err(RotationError::config("A seed file only applies to the memory backend"));
        }

        Ok(())
    }
}

/// Where the credentials that authorize the password change come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCredentialSource {
    /// The rotated user changes its own password with its CURRENT credentials.
    SameSecret,
    /// A privileged user, read from this secret's CURRENT version, issues the change.
    AdminSecret(String),
}

/// Rotation behaviour
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RotationConfig {
    /// Length of generated passwords
    #[validate(range(
        min = 16,
        max = 128,
        message = "Password length must be between 16 and 128"
    ))]
    pub password_length: usize,

    /// Require at least one upper, lower, digit and punctuation character
    pub require_each_character_class: bool,

    /// Separate secret holding administrative credentials
    #[validate(length(min = 1, message = "Admin secret id cannot be empty"))]
    pub admin_secret_id: Option<String>,

    /// Refuse to rotate secrets whose rotation flag is off
    pub require_rotation_enabled: bool,

    /// Function the store invokes for scheduled rotations (`enable-rotation`)
    pub rotation_lambda_arn: Option<String>,

    /// Days between scheduled rotations (`enable-rotation`)
    #[validate(range(min = 1, max = 1000, message = "Rotation interval must be between 1 and 1000 days"))]
    pub rotation_days: u32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            password_length: 32,
            require_each_character_class: true,
            admin_secret_id: None,
            require_rotation_enabled: true,
            rotation_lambda_arn: None,
            rotation_days: 8,
        }
    }
}

impl RotationConfig {
    pub fn admin_source(&self) -> AdminCredentialSource {
        match &self.admin_secret_id {
            Some(id) => AdminCredentialSource::AdminSecret(id.clone()),
            None => AdminCredentialSource::SameSecret,
        }
    }

    /// Schedule used when turning rotation on for a secret
    pub fn schedule(&self) -> RotationSchedule {
        RotationSchedule {
            rotation_lambda_arn: self.rotation_lambda_arn.clone(),
            automatically_after_days: self.rotation_days,
        }
    }

    /// Create RotationConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            password_length: env_parse("PASSWORD_LENGTH")?.unwrap_or(defaults.password_length),
            require_each_character_class: env_bool("REQUIRE_EACH_CHARACTER_CLASS")
                .unwrap_or(defaults.require_each_character_class),
            admin_secret_id: env_string("ADMIN_SECRET_ID"),
            require_rotation_enabled: env_bool("REQUIRE_ROTATION_ENABLED")
                .unwrap_or(defaults.require_rotation_enabled),
            rotation_lambda_arn: env_string("ROTATION_LAMBDA_ARN"),
            rotation_days: env_parse("ROTATION_DAYS")?.unwrap_or(defaults.rotation_days),
        })
    }
}

/// TLS negotiation for database sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

impl FromStr for SslMode {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            other => Err(RotationError::config(format!(
                "Invalid SSL mode '{}': expected disable, prefer or require",
                other
            ))),
        }
    }
}

/// Database session configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Per-statement timeout in seconds
    #[validate(range(
        min = 1,
        max = 300,
        message = "Statement timeout must be between 1 and 300 seconds"
    ))]
    pub statement_timeout_seconds: u64,

    pub ssl_mode: SslMode,

    /// Port used when a secret does not name one
    #[validate(range(min = 1, message = "Default port must be between 1 and 65535"))]
    pub default_port: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: 5,
            statement_timeout_seconds: 10,
            ssl_mode: SslMode::Prefer,
            default_port: crate::secrets::fields::DEFAULT_POSTGRES_PORT,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get statement timeout as Duration
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_seconds)
    }

    /// Create DatabaseConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            connect_timeout_seconds: env_parse("DB_CONNECT_TIMEOUT_SECONDS")?
                .unwrap_or(defaults.connect_timeout_seconds),
            statement_timeout_seconds: env_parse("DB_STATEMENT_TIMEOUT_SECONDS")?
                .unwrap_or(defaults.statement_timeout_seconds),
            ssl_mode: env_parse("DB_SSL_MODE")?.unwrap_or(defaults.ssl_mode),
            default_port: env_parse("DB_DEFAULT_PORT")?.unwrap_or(defaults.default_port),
        })
    }
}

/// Secret store implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecretStoreBackend {
    /// Process-local store, optionally seeded from a file
    #[default]
    Memory,
    /// AWS Secrets Manager
    Aws,
}

impl FromStr for SecretStoreBackend {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "aws" | "aws_secrets_manager" => Ok(Self::Aws),
            other => Err(RotationError::config(format!(
                "Invalid secret store backend '{}': expected memory or aws",
                other
            ))),
        }
    }
}

impl fmt::Display for SecretStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Aws => write!(f, "aws"),
        }
    }
}

/// Secret store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SecretStoreConfig {
    pub backend: SecretStoreBackend,

    /// JSON file loaded into the memory backend at startup
    pub seed_file: Option<PathBuf>,

    /// AWS region override
    pub region: Option<String>,

    /// Endpoint override (LocalStack and similar)
    pub endpoint_url: Option<String>,

    /// Bound on a single store call, retries included
    #[validate(range(
        min = 1,
        max = 300,
        message = "Store operation timeout must be between 1 and 300 seconds"
    ))]
    pub operation_timeout_seconds: u64,
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self {
            backend: SecretStoreBackend::Memory,
            seed_file: None,
            region: None,
            endpoint_url: None,
            operation_timeout_seconds: 30,
        }
    }
}

impl SecretStoreConfig {
    /// Create SecretStoreConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            backend: env_parse("SECRET_STORE")?.unwrap_or(defaults.backend),
            seed_file: env_string("SECRET_STORE_SEED_FILE").map(PathBuf::from),
            region: env_string("AWS_REGION"),
            endpoint_url: env_string("AWS_ENDPOINT_URL"),
            operation_timeout_seconds: env_parse("SECRET_STORE_TIMEOUT_SECONDS")?
                .unwrap_or(defaults.operation_timeout_seconds),
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level or EnvFilter directive (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Service name attached to log output
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            service_name: "pgrotate".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Create ObservabilityConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            log_level: env_string("LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: env_bool("JSON_LOGGING").unwrap_or(defaults.json_logging),
            service_name: env_string("SERVICE_NAME").unwrap_or(defaults.service_name),
        })
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name)).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
    env_string(name).map(|s| s.eq_ignore_ascii_case("true") || s == "1")
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env_string(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                RotationError::config(format!("Invalid value for {}{}: {}", ENV_PREFIX, name, e))
            })
        })
        .transpose()
}
