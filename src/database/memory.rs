//! In-memory database for tests and dry runs.
//!
//! Models just enough of PostgreSQL authentication for rotation: roles
//! with passwords, a superuser flag, reachability and a count of open
//! sessions so tests can assert that every connection is closed.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::command::AdminCommand;
use super::error::DatabaseError;
use super::{ConnectParams, CredentialDatabase, DatabaseConnection};
use crate::secrets::SecretString;

#[derive(Debug, Default)]
struct State {
    roles: HashMap<String, SecretString>,
    superusers: HashSet<String>,
    unreachable: bool,
    fail_commands: bool,
    open_connections: usize,
    commands: Vec<String>,
}

/// Shared in-memory database; clones see the same roles.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a role that can log in with `password`.
    pub fn with_role(self, name: &str, password: &str) -> Self {
        self.lock().roles.insert(name.to_string(), SecretString::new(password));
        self
    }

    /// Add a role allowed to change any other role's password.
    pub fn with_superuser(self, name: &str, password: &str) -> Self {
        {
            let mut state = self.lock();
            state.roles.insert(name.to_string(), SecretString::new(password));
            state.superusers.insert(name.to_string());
        }
        self
    }

    /// Whether `role` would log in with `password` right now.
    pub fn authenticates(&self, role: &str, password: &str) -> bool {
        self.lock().roles.get(role).is_some_and(|p| p.expose_secret() == password)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().unreachable = !reachable;
    }

    /// Make every administrative command fail as if the server refused it.
    pub fn fail_commands(&self, fail: bool) {
        self.lock().fail_commands = fail;
    }

    pub fn open_connections(&self) -> usize {
        self.lock().open_connections
    }

    /// Roles whose password was changed, in order.
    pub fn commands_executed(&self) -> Vec<String> {
        self.lock().commands.clone()
    }
}

#[async_trait]
impl CredentialDatabase for InMemoryDatabase {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<Box<dyn DatabaseConnection>, DatabaseError> {
        let mut state = self.lock();
        if state.unreachable {
            return Err(DatabaseError::unavailable(format!(
                "could not connect to {}:{}",
                params.host, params.port
            )));
        }

        match state.roles.get(&params.username) {
            Some(password) if password == &params.password => {}
            _ => {
                return Err(DatabaseError::authentication(
                    &params.username,
                    "password authentication failed",
                ));
            }
        }

        state.open_connections += 1;
        Ok(Box::new(InMemoryConnection {
            database: self.clone(),
            user: params.username.clone(),
            closed: false,
        }))
    }
}

struct InMemoryConnection {
    database: InMemoryDatabase,
    user: String,
    closed: bool,
}

impl InMemoryConnection {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.database.lock();
            state.open_connections = state.open_connections.saturating_sub(1);
        }
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl DatabaseConnection for InMemoryConnection {
    async fn execute(&mut self, command: &AdminCommand) -> Result<(), DatabaseError> {
        // Same validation as the real adapter
        command.render()?;

        let mut state = self.database.lock();
        if state.unreachable {
            return Err(DatabaseError::unavailable("server closed the connection"));
        }
        if state.fail_commands {
            return Err(DatabaseError::command_failed("command refused by server"));
        }

        match command {
            AdminCommand::SetPassword { role, password } => {
                if !state.roles.contains_key(role) {
                    return Err(DatabaseError::command_failed(format!(
                        "role \"{}\" does not exist",
                        role
                    )));
                }
                if *role != self.user && !state.superusers.contains(&self.user) {
                    return Err(DatabaseError::command_failed(
                        "permission denied to alter role",
                    ));
                }
                state.roles.insert(role.clone(), password.clone());
                state.commands.push(role.clone());
            }
        }
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), DatabaseError> {
        if self.database.lock().unreachable {
            return Err(DatabaseError::unavailable("server closed the connection"));
        }
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<(), DatabaseError> {
        self.release();
        Ok(())
    }
}
