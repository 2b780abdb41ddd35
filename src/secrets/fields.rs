//! Database credential payload stored in a secret version.
//!
//! The payload is a JSON object. Only the connection fields are interpreted;
//! every other key is carried through untouched when a `CURRENT` version is
//! copied into a new `PENDING` one.

use serde_json::{Map, Value};
use std::fmt;

use super::types::SecretString;
use crate::database::ConnectParams;
use crate::errors::{Result, RotationError};

/// Port used when the payload does not name one
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Database used when the payload does not name one
pub const DEFAULT_DATABASE: &str = "postgres";

const HOST_KEYS: &[&str] = &["host"];
const PORT_KEYS: &[&str] = &["port"];
const DBNAME_KEYS: &[&str] = &["dbname", "db_name"];
const USERNAME_KEYS: &[&str] = &["username", "db_user", "user"];
const PASSWORD_KEYS: &[&str] = &["password", "db_password"];

/// Parsed database credential secret.
#[derive(Clone)]
pub struct DatabaseSecret {
    /// All payload keys except the password
    fields: Map<String, Value>,
    /// Key the password was read from, reused on write
    password_key: String,
    host: String,
    port: u16,
    dbname: String,
    username: String,
    password: SecretString,
}

impl DatabaseSecret {
    /// Parse a secret payload.
    ///
    /// Requires `host`, a username and a password. `port` may be a number or a
    /// numeric string and defaults to 5432; the database defaults to `postgres`.
    pub fn parse(secret_id: &str, value: &SecretString) -> Result<Self> {
        Self::parse_with_default_port(secret_id, value, DEFAULT_POSTGRES_PORT)
    }

    /// [`DatabaseSecret::parse`] with a different port for payloads that omit one.
    pub fn parse_with_default_port(
        secret_id: &str,
        value: &SecretString,
        default_port: u16,
    ) -> Result<Self> {
        let mut fields = parse_object(secret_id, value)?;

        let (password_key, password) = take_password(secret_id, &mut fields)?;
        let host = string_field(&fields, HOST_KEYS)
            .ok_or_else(|| RotationError::invalid_secret(secret_id, "missing field 'host'"))?;
        let port = port_field(secret_id, &fields)?.unwrap_or(default_port);
        let dbname =
            string_field(&fields, DBNAME_KEYS).unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let username = string_field(&fields, USERNAME_KEYS)
            .ok_or_else(|| RotationError::invalid_secret(secret_id, "missing field 'username'"))?;

        Ok(Self { fields, password_key, host, port, dbname, username, password })
    }

    /// Parse an administrative login secret.
    ///
    /// Only the username and password are required; connection fields the
    /// admin secret leaves out are taken from `target`.
    pub fn parse_admin(
        secret_id: &str,
        value: &SecretString,
        target: &DatabaseSecret,
    ) -> Result<ConnectParams> {
        let mut fields = parse_object(secret_id, value)?;
        let (_, password) = take_password(secret_id, &mut fields)?;
        let username = string_field(&fields, USERNAME_KEYS)
            .ok_or_else(|| RotationError::invalid_secret(secret_id, "missing field 'username'"))?;

        Ok(ConnectParams {
            host: string_field(&fields, HOST_KEYS).unwrap_or_else(|| target.host.clone()),
            port: port_field(secret_id, &fields)?.unwrap_or(target.port),
            dbname: string_field(&fields, DBNAME_KEYS).unwrap_or_else(|| target.dbname.clone()),
            username,
            password,
        })
    }

    /// Copy of this secret with a different password; all other fields unchanged
    pub fn with_password(&self, password: SecretString) -> Self {
        Self { password, ..self.clone() }
    }

    /// Serialize back to the payload format, password included
    pub fn to_secret_string(&self) -> Result<SecretString> {
        let mut payload = self.fields.clone();
        payload.insert(
            self.password_key.clone(),
            Value::String(self.password.expose_secret().to_string()),
        );
        let json = serde_json::to_string(&payload)
            .map_err(|e| RotationError::config(format!("cannot serialize secret payload: {}", e)))?;
        Ok(SecretString::new(json))
    }

    /// Parameters for logging in as this secret's user
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            host: self.host.clone(),
            port: self.port,
            dbname: self.dbname.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// Whether both secrets address the same user on the same server
    pub fn same_identity(&self, other: &DatabaseSecret) -> bool {
        self.username == other.username && self.host == other.host && self.port == other.port
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn dbname(&self) -> &str {
        &self.dbname
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Non-credential payload field, for inspection
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl fmt::Debug for DatabaseSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSecret")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("username", &self.username)
            .field("password", &self.password)
            .finish()
    }
}

fn parse_object(secret_id: &str, value: &SecretString) -> Result<Map<String, Value>> {
    // The serde_json message can quote the input, so only its category is reported.
    match serde_json::from_str::<Value>(value.expose_secret()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RotationError::invalid_secret(secret_id, "payload is not a JSON object")),
        Err(e) => Err(RotationError::invalid_secret(
            secret_id,
            format!("payload is not valid JSON ({:?} error at line {})", e.classify(), e.line()),
        )),
    }
}

fn take_password(
    secret_id: &str,
    fields: &mut Map<String, Value>,
) -> Result<(String, SecretString)> {
    for key in PASSWORD_KEYS {
        if let Some(value) = fields.remove(*key) {
            return match value {
                Value::String(password) => Ok((key.to_string(), SecretString::new(password))),
                _ => Err(RotationError::invalid_secret(
                    secret_id,
                    format!("field '{}' must be a string", key),
                )),
            };
        }
    }
    Err(RotationError::invalid_secret(secret_id, "missing field 'password'"))
}

fn string_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .find_map(|value| value.as_str())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn port_field(secret_id: &str, fields: &Map<String, Value>) -> Result<Option<u16>> {
    let Some(value) = PORT_KEYS.iter().find_map(|key| fields.get(*key)) else {
        return Ok(None);
    };

    let port = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u16>().ok(),
        _ => None,
    };

    match port {
        Some(0) | None => Err(RotationError::invalid_secret(
            secret_id,
            format!("field 'port' is not a valid TCP port: {}", value),
        )),
        Some(port) => Ok(Some(port)),
    }
}
