//! # Structured Logging
//!
//! Subscriber initialisation and the span macro used around rotation steps.
//!
//! Secret values never reach a log line: passwords travel as
//! [`SecretString`](crate::secrets::SecretString), which renders as
//! `[REDACTED]`, and store/database errors carry identifiers only.

use crate::config::{AdminCredentialSource, AppConfig, ObservabilityConfig};
use crate::errors::{Result, RotationError};
use tracing_subscriber::EnvFilter;

/// Create a tracing span for one rotation step.
///
/// ```rust,ignore
/// let span = rotation_span!("db/app", "createSecret");
/// let span = rotation_span!("db/app", "setSecret", token = "v2");
/// ```
#[macro_export]
macro_rules! rotation_span {
    ($secret_id:expr, $step:expr) => {
        tracing::info_span!(
            "rotation_step",
            secret_id = %$secret_id,
            step = %$step,
            request_id = %uuid::Uuid::new_v4()
        )
    };
    ($secret_id:expr, $step:expr, $($field:tt)*) => {
        tracing::info_span!(
            "rotation_step",
            secret_id = %$secret_id,
            step = %$step,
            request_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| RotationError::config(format!("Invalid log level: {}", e)))?;

    let result = if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
    };

    result.map_err(|e| RotationError::config(format!("Failed to initialise logging: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    let admin_mode = match config.rotation.admin_source() {
        AdminCredentialSource::SameSecret => "same_secret".to_string(),
        AdminCredentialSource::AdminSecret(id) => format!("admin_secret:{}", id),
    };

    tracing::info!(
        app_name = crate::APP_NAME,
        version = crate::VERSION,
        service_name = %config.observability.service_name,
        secret_store = %config.secret_store.backend,
        admin_credentials = %admin_mode,
        password_length = config.rotation.password_length,
        require_rotation_enabled = config.rotation.require_rotation_enabled,
        connect_timeout_seconds = config.database.connect_timeout_seconds,
        ssl_mode = ?config.database.ssl_mode,
        "pgrotate configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = rotation_span!("db/app", "createSecret");
        let _span = rotation_span!("db/app", "setSecret", token = "v2");
    }

    #[test]
    fn test_log_config_info() {
        let config = AppConfig::default();
        log_config_info(&config);
    }
}
