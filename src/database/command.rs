//! Administrative commands and PostgreSQL quoting.
//!
//! PostgreSQL does not accept bind parameters in `ALTER ROLE ... PASSWORD`,
//! so the role name and password are embedded as a quoted identifier and a
//! quoted literal. All quoting for administrative SQL lives here; callers
//! build an [`AdminCommand`] and never format SQL themselves.

use super::error::DatabaseError;
use crate::secrets::SecretString;

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1)
pub const MAX_IDENTIFIER_BYTES: usize = 63;

/// A privileged operation on the database's authentication state.
#[derive(Debug, Clone)]
pub enum AdminCommand {
    /// Set `role`'s password to `password`, whatever it was before.
    SetPassword { role: String, password: SecretString },
}

impl AdminCommand {
    pub fn set_password(role: impl Into<String>, password: SecretString) -> Self {
        Self::SetPassword { role: role.into(), password }
    }

    /// Role the command acts on
    pub fn role(&self) -> &str {
        match self {
            Self::SetPassword { role, .. } => role,
        }
    }

    /// Render as a single SQL statement.
    ///
    /// The result embeds the password and is returned as a [`SecretString`].
    pub fn render(&self) -> Result<SecretString, DatabaseError> {
        match self {
            Self::SetPassword { role, password } => {
                let role = quote_identifier(role)?;
                let password = quote_literal(password.expose_secret())?;
                Ok(SecretString::new(format!("ALTER ROLE {} WITH PASSWORD {}", role, password)))
            }
        }
    }
}

/// Quote an identifier: wrap in double quotes, double any embedded `"`.
pub fn quote_identifier(identifier: &str) -> Result<String, DatabaseError> {
    if identifier.is_empty() {
        return Err(DatabaseError::invalid_command("identifier cannot be empty"));
    }
    if identifier.len() > MAX_IDENTIFIER_BYTES {
        return Err(DatabaseError::invalid_command(format!(
            "identifier exceeds {} bytes (got {})",
            MAX_IDENTIFIER_BYTES,
            identifier.len()
        )));
    }
    if identifier.contains('\0') {
        return Err(DatabaseError::invalid_command("identifier cannot contain NUL"));
    }

    Ok(format!("\"{}\"", identifier.replace('"', "\"\"")))
}

/// Quote a string literal: wrap in single quotes, double any embedded `'`.
///
/// Values containing a backslash use the `E'...'` form with backslashes
/// doubled, so the result means the same regardless of
/// `standard_conforming_strings`.
pub fn quote_literal(value: &str) -> Result<String, DatabaseError> {
    if value.contains('\0') {
        // The message must not echo the value; it is usually a password
        return Err(DatabaseError::invalid_command("literal cannot contain NUL"));
    }

    let escaped = value.replace('\'', "''");
    if value.contains('\\') {
        Ok(format!("E'{}'", escaped.replace('\\', "\\\\")))
    } else {
        Ok(format!("'{}'", escaped))
    }
}
