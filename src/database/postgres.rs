//! PostgreSQL access through sqlx.
//!
//! Each [`PostgresDatabase::connect`] opens a dedicated `PgConnection` (no
//! pool): rotation steps log in as different users and must never reuse a
//! session authenticated with a stale password.
//!
//! Statement logging is switched off on every connection: the password
//! change is plain SQL text and sqlx would otherwise log it.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{ConnectOptions, Connection, Executor};
use std::time::Duration;

use super::command::AdminCommand;
use super::error::DatabaseError;
use super::{ConnectParams, CredentialDatabase, DatabaseConnection};
use crate::config::{DatabaseConfig, SslMode};

/// SQLSTATE invalid_password
const INVALID_PASSWORD: &str = "28P01";
/// SQLSTATE invalid_authorization_specification
const INVALID_AUTHORIZATION: &str = "28000";

const APPLICATION_NAME: &str = "pgrotate";

/// PostgreSQL server reached over TCP.
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    connect_timeout: Duration,
    statement_timeout: Duration,
    ssl_mode: PgSslMode,
}

impl PostgresDatabase {
    pub fn new(config: &DatabaseConfig) -> Self {
        let ssl_mode = match config.ssl_mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
        };

        Self {
            connect_timeout: config.connect_timeout(),
            statement_timeout: config.statement_timeout(),
            ssl_mode,
        }
    }

    fn options(&self, params: &ConnectParams) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .database(&params.dbname)
            .username(&params.username)
            .password(params.password.expose_secret())
            .ssl_mode(self.ssl_mode)
            .application_name(APPLICATION_NAME)
            .options([("statement_timeout", self.statement_timeout.as_millis().to_string())])
            .disable_statement_logging()
    }
}

#[async_trait]
impl CredentialDatabase for PostgresDatabase {
    #[tracing::instrument(skip(self, params), fields(host = %params.host, port = params.port, user = %params.username))]
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<Box<dyn DatabaseConnection>, DatabaseError> {
        let options = self.options(params);

        let connection =
            tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options))
                .await
                .map_err(|_| DatabaseError::timeout("connect", self.connect_timeout.as_secs()))?
                .map_err(|e| classify_connect_error(&params.username, e))?;

        tracing::debug!("Opened database session");
        Ok(Box::new(PostgresConnection {
            connection,
            statement_timeout: self.statement_timeout,
        }))
    }
}

/// A single authenticated PostgreSQL session.
pub struct PostgresConnection {
    connection: PgConnection,
    statement_timeout: Duration,
}

#[async_trait]
impl DatabaseConnection for PostgresConnection {
    async fn execute(&mut self, command: &AdminCommand) -> Result<(), DatabaseError> {
        let sql = command.render()?;
        let password = match command {
            AdminCommand::SetPassword { password, .. } => password.expose_secret(),
        };

        let result = tokio::time::timeout(
            self.statement_timeout,
            Executor::execute(&mut self.connection, sqlx::raw_sql(sql.expose_secret())),
        )
        .await
        .map_err(|_| DatabaseError::timeout("command", self.statement_timeout.as_secs()))?;

        match result {
            Ok(_) => {
                tracing::info!(role = %command.role(), "Applied password change");
                Ok(())
            }
            Err(e) => Err(redact(classify_command_error(e), password)),
        }
    }

    async fn ping(&mut self) -> Result<(), DatabaseError> {
        tokio::time::timeout(
            self.statement_timeout,
            sqlx::query("SELECT 1").execute(&mut self.connection),
        )
        .await
        .map_err(|_| DatabaseError::timeout("ping", self.statement_timeout.as_secs()))?
        .map_err(classify_command_error)?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DatabaseError> {
        let this = *self;
        this.connection.close().await.map_err(|e| DatabaseError::unavailable(e.to_string()))
    }
}

fn classify_connect_error(user: &str, err: sqlx::Error) -> DatabaseError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some(INVALID_PASSWORD) | Some(INVALID_AUTHORIZATION) => {
                DatabaseError::authentication(user, db_err.message())
            }
            _ => DatabaseError::unavailable(db_err.message().to_string()),
        },
        _ => DatabaseError::unavailable(err.to_string()),
    }
}

fn classify_command_error(err: sqlx::Error) -> DatabaseError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            DatabaseError::command_failed(format!("{} (SQLSTATE {})", db_err.message(), code))
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => {
            DatabaseError::unavailable(err.to_string())
        }
        _ => DatabaseError::command_failed(err.to_string()),
    }
}

/// Server messages may quote the statement text; strip the password from them.
fn redact(err: DatabaseError, password: &str) -> DatabaseError {
    if password.is_empty() {
        return err;
    }
    match err {
        DatabaseError::CommandFailed { message } => {
            DatabaseError::command_failed(message.replace(password, "[REDACTED]"))
        }
        DatabaseError::Unavailable { message } => {
            DatabaseError::unavailable(message.replace(password, "[REDACTED]"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretString;

    fn params() -> ConnectParams {
        ConnectParams {
            host: "db.internal".to_string(),
            port: 6432,
            dbname: "orders".to_string(),
            username: "app".to_string(),
            password: SecretString::new("pw"),
        }
    }

    #[test]
    fn test_options_from_params() {
        let db = PostgresDatabase::new(&DatabaseConfig::default());
        let options = db.options(&params());
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_username(), "app");
        assert_eq!(options.get_database(), Some("orders"));
    }

    #[test]
    fn test_redact_strips_password() {
        let err = DatabaseError::command_failed("syntax error at or near \"hunter2hunter2\"");
        let redacted = redact(err, "hunter2hunter2");
        assert!(!redacted.to_string().contains("hunter2hunter2"));
        assert!(redacted.to_string().contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Accepts connections and never answers the startup message
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = DatabaseConfig {
            connect_timeout_seconds: 1,
            ssl_mode: SslMode::Disable,
            ..Default::default()
        };
        let db = PostgresDatabase::new(&config);
        let mut silent = params();
        silent.host = "127.0.0.1".to_string();
        silent.port = port;

        let started = std::time::Instant::now();
        let err = match db.connect(&silent).await {
            Ok(_) => panic!("silent server should not complete a login"),
            Err(e) => e,
        };
        assert!(matches!(err, DatabaseError::Timeout { .. }), "unexpected error: {}", err);
        assert!(err.is_transient());
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        server.abort();
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable_or_timeout() {
        let config = DatabaseConfig { connect_timeout_seconds: 1, ..Default::default() };
        let db = PostgresDatabase::new(&config);
        let mut unreachable = params();
        unreachable.host = "127.0.0.1".to_string();
        unreachable.port = 1;

        let err = match db.connect(&unreachable).await {
            Ok(_) => panic!("connection to port 1 should fail"),
            Err(e) => e,
        };
        assert!(err.is_transient(), "unexpected error: {}", err);
    }
}
