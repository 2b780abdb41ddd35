//! # Database Access
//!
//! The two database operations the rotation needs, behind traits:
//! logging in as a user ([`CredentialDatabase::connect`]) and running an
//! [`AdminCommand`] or a trivial authenticated query on that session.
//!
//! Connections are short-lived: a step opens one, uses it for a single
//! operation and closes it with [`close_quietly`] on every exit path.

pub mod command;
pub mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::fmt;

pub use command::{quote_identifier, quote_literal, AdminCommand};
pub use error::DatabaseError;
pub use memory::InMemoryDatabase;
pub use postgres::PostgresDatabase;

use crate::secrets::SecretString;

/// Everything needed to log in as one database user.
#[derive(Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub username: String,
    pub password: SecretString,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("username", &self.username)
            .field("password", &self.password)
            .finish()
    }
}

/// A database whose users can be logged in as.
#[async_trait]
pub trait CredentialDatabase: Send + Sync {
    /// Open a session as `params.username`.
    ///
    /// # Errors
    ///
    /// - [`DatabaseError::Authentication`] if the password is rejected
    /// - [`DatabaseError::Unavailable`] / [`DatabaseError::Timeout`] if the
    ///   server cannot be reached within the configured bound
    async fn connect(&self, params: &ConnectParams)
        -> Result<Box<dyn DatabaseConnection>, DatabaseError>;
}

/// An open, authenticated session.
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Run an administrative command.
    async fn execute(&mut self, command: &AdminCommand) -> Result<(), DatabaseError>;

    /// Run a trivial authenticated query.
    async fn ping(&mut self) -> Result<(), DatabaseError>;

    /// Close the session.
    async fn close(self: Box<Self>) -> Result<(), DatabaseError>;
}

/// Close a connection, logging rather than returning a close failure.
pub async fn close_quietly(connection: Box<dyn DatabaseConnection>) {
    if let Err(e) = connection.close().await {
        tracing::warn!(error = %e, "Failed to close database connection cleanly");
    }
}
