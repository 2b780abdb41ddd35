//! # Error Types
//!
//! Rotation error taxonomy using `thiserror`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::DatabaseError;
use crate::secrets::SecretsError;

/// Main error type for the rotation coordinator and step handlers
#[derive(thiserror::Error, Debug)]
pub enum RotationError {
    /// The requested step name is not one of the four protocol steps
    #[error("Unknown rotation step: '{step}'")]
    UnknownStep { step: String },

    /// A step that needs a PENDING version ran before `createSecret` succeeded
    #[error("Secret '{secret_id}' has no PENDING version; run createSecret first")]
    MissingPendingVersion { secret_id: String },

    /// The PENDING credential did not authenticate against the database
    #[error("PENDING credential for '{secret_id}' failed verification: {message}")]
    CredentialVerification { secret_id: String, message: String },

    /// Transient secret store failure, safe to retry the same step
    #[error("Secret store unavailable: {source}")]
    StoreUnavailable {
        #[source]
        source: SecretsError,
    },

    /// Transient database failure (unreachable, timed out), safe to retry the same step
    #[error("Database unavailable: {source}")]
    DatabaseUnavailable {
        #[source]
        source: DatabaseError,
    },

    /// The administrative password-change command failed
    #[error("Password change command failed for user '{user}': {message}")]
    CommandExecution { user: String, message: String },

    /// Secret store state contradicts the protocol (e.g. no CURRENT version)
    #[error("Inconsistent rotation state for '{secret_id}': {message}")]
    InconsistentState { secret_id: String, message: String },

    /// The secret does not have rotation enabled
    #[error("Rotation is not enabled for secret '{secret_id}'")]
    RotationNotEnabled { secret_id: String },

    /// The secret payload is missing fields or cannot be parsed
    #[error("Invalid secret '{secret_id}': {message}")]
    InvalidSecret { secret_id: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Machine-readable error kind surfaced to the invoking scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownStep,
    MissingPendingVersion,
    CredentialVerification,
    StoreUnavailable,
    DatabaseUnavailable,
    CommandExecution,
    InconsistentState,
    RotationNotEnabled,
    InvalidSecret,
    Config,
}

impl ErrorKind {
    /// Stable string form, identical to the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownStep => "unknown_step",
            ErrorKind::MissingPendingVersion => "missing_pending_version",
            ErrorKind::CredentialVerification => "credential_verification",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::DatabaseUnavailable => "database_unavailable",
            ErrorKind::CommandExecution => "command_execution",
            ErrorKind::InconsistentState => "inconsistent_state",
            ErrorKind::RotationNotEnabled => "rotation_not_enabled",
            ErrorKind::InvalidSecret => "invalid_secret",
            ErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RotationError {
    /// Create an unknown step error
    pub fn unknown_step<S: Into<String>>(step: S) -> Self {
        Self::UnknownStep { step: step.into() }
    }

    /// Create a missing PENDING version error
    pub fn missing_pending<S: Into<String>>(secret_id: S) -> Self {
        Self::MissingPendingVersion { secret_id: secret_id.into() }
    }

    /// Create a credential verification error
    pub fn verification<S: Into<String>, M: Into<String>>(secret_id: S, message: M) -> Self {
        Self::CredentialVerification { secret_id: secret_id.into(), message: message.into() }
    }

    /// Create a command execution error
    pub fn command<U: Into<String>, M: Into<String>>(user: U, message: M) -> Self {
        Self::CommandExecution { user: user.into(), message: message.into() }
    }

    /// Create an inconsistent state error
    pub fn inconsistent<S: Into<String>, M: Into<String>>(secret_id: S, message: M) -> Self {
        Self::InconsistentState { secret_id: secret_id.into(), message: message.into() }
    }

    /// Create an invalid secret error
    pub fn invalid_secret<S: Into<String>, M: Into<String>>(secret_id: S, message: M) -> Self {
        Self::InvalidSecret { secret_id: secret_id.into(), message: message.into() }
    }

    /// Create a rotation-disabled error
    pub fn rotation_not_enabled<S: Into<String>>(secret_id: S) -> Self {
        Self::RotationNotEnabled { secret_id: secret_id.into() }
    }

    /// Wrap a transient database failure
    pub fn database_unavailable(source: DatabaseError) -> Self {
        Self::DatabaseUnavailable { source }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Wrap a secret store failure.
    ///
    /// A missing secret is a bad request rather than an outage, so `NotFound`
    /// becomes [`RotationError::InvalidSecret`]; everything else is transient.
    pub fn from_store(secret_id: &str, error: SecretsError) -> Self {
        match error {
            SecretsError::NotFound { .. } => Self::invalid_secret(secret_id, error.to_string()),
            SecretsError::InvalidValue { .. } | SecretsError::SerializationError(_) => {
                Self::invalid_secret(secret_id, error.to_string())
            }
            other => Self::StoreUnavailable { source: other },
        }
    }

    /// Machine-readable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RotationError::UnknownStep { .. } => ErrorKind::UnknownStep,
            RotationError::MissingPendingVersion { .. } => ErrorKind::MissingPendingVersion,
            RotationError::CredentialVerification { .. } => ErrorKind::CredentialVerification,
            RotationError::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            RotationError::DatabaseUnavailable { .. } => ErrorKind::DatabaseUnavailable,
            RotationError::CommandExecution { .. } => ErrorKind::CommandExecution,
            RotationError::InconsistentState { .. } => ErrorKind::InconsistentState,
            RotationError::RotationNotEnabled { .. } => ErrorKind::RotationNotEnabled,
            RotationError::InvalidSecret { .. } => ErrorKind::InvalidSecret,
            RotationError::Config { .. } => ErrorKind::Config,
        }
    }

    /// Check if the same step can be retried without investigation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RotationError::StoreUnavailable { .. } | RotationError::DatabaseUnavailable { .. }
        )
    }
}

impl From<validator::ValidationErrors> for RotationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages = Vec::new();
        collect_validation_messages("", &errors, &mut messages);
        messages.sort();
        Self::config(format!("Validation failed: {}", messages.join("; ")))
    }
}

fn collect_validation_messages(
    prefix: &str,
    errors: &validator::ValidationErrors,
    out: &mut Vec<String>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path =
            if prefix.is_empty() { field.to_string() } else { format!("{}.{}", prefix, field) };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                out.push(format!("{}: {}", path, error_messages.join(", ")));
            }
            ValidationErrorsKind::Struct(inner) => collect_validation_messages(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_validation_messages(&format!("{}[{}]", path, index), inner, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = RotationError::unknown_step("rotateEverything");
        assert!(matches!(error, RotationError::UnknownStep { .. }));
        assert_eq!(error.to_string(), "Unknown rotation step: 'rotateEverything'");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(RotationError::unknown_step("x").kind(), ErrorKind::UnknownStep);
        assert_eq!(RotationError::missing_pending("s").kind(), ErrorKind::MissingPendingVersion);
        assert_eq!(
            RotationError::verification("s", "denied").kind(),
            ErrorKind::CredentialVerification
        );
        assert_eq!(RotationError::command("app", "boom").kind(), ErrorKind::CommandExecution);
        assert_eq!(RotationError::config("bad").kind(), ErrorKind::Config);
    }

    #[test]
    fn test_retryable_errors() {
        let store = RotationError::from_store("s", SecretsError::connection_failed("timeout"));
        assert!(store.is_retryable());
        assert_eq!(store.kind(), ErrorKind::StoreUnavailable);

        let db = RotationError::DatabaseUnavailable { source: DatabaseError::timeout("connect", 5) };
        assert!(db.is_retryable());

        assert!(!RotationError::unknown_step("x").is_retryable());
        assert!(!RotationError::command("app", "syntax error").is_retryable());
        assert!(!RotationError::verification("s", "denied").is_retryable());
    }

    #[test]
    fn test_store_not_found_is_invalid_secret() {
        let err = RotationError::from_store("db/app", SecretsError::not_found("db/app"));
        assert_eq!(err.kind(), ErrorKind::InvalidSecret);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::MissingPendingVersion).unwrap();
        assert_eq!(json, "\"missing_pending_version\"");
        assert_eq!(ErrorKind::CommandExecution.to_string(), "command_execution");
    }
}
