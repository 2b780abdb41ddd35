//! Error types for database operations.

use thiserror::Error;

/// Errors from connecting to the database or running a command on it.
///
/// Messages come from the server or driver and never include the password.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The server rejected the login credentials.
    #[error("Authentication rejected for user '{user}': {message}")]
    Authentication { user: String, message: String },

    /// The server could not be reached or the connection broke.
    #[error("Database unreachable: {message}")]
    Unavailable { message: String },

    /// An operation did not finish within its bound.
    #[error("Database {operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// The server refused or failed the command.
    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    /// The command could not be built safely (bad identifier, NUL byte).
    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },
}

impl DatabaseError {
    pub fn authentication(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication { user: user.into(), message: message.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout { operation: operation.into(), seconds }
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Self::CommandFailed { message: message.into() }
    }

    pub fn invalid_command(reason: impl Into<String>) -> Self {
        Self::InvalidCommand { reason: reason.into() }
    }

    /// Whether the failure is a connectivity problem worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DatabaseError::unavailable("connection refused").is_transient());
        assert!(DatabaseError::timeout("connect", 5).is_transient());
        assert!(!DatabaseError::authentication("app", "password mismatch").is_transient());
        assert!(!DatabaseError::command_failed("permission denied").is_transient());
    }

    #[test]
    fn test_timeout_display() {
        let err = DatabaseError::timeout("connect", 5);
        assert_eq!(err.to_string(), "Database connect timed out after 5s");
    }
}
