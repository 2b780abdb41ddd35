//! # pgrotate
//!
//! Rotates PostgreSQL passwords held in a versioned secret store without an
//! authentication gap.
//!
//! ## Architecture
//!
//! ```text
//! scheduler → RotationCoordinator → step handlers → SecretStore
//!                                               └→ CredentialDatabase
//! ```
//!
//! A rotation is four idempotent steps (`createSecret`, `setSecret`,
//! `testSecret`, `finishSecret`). The secret store's `AWSCURRENT` /
//! `AWSPENDING` labels are the only rotation state, so each step can be
//! retried or resumed from whatever the store says.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pgrotate::config::AppConfig;
//! use pgrotate::database::PostgresDatabase;
//! use pgrotate::rotation::{RotationCoordinator, RotationRequest, RotationStep};
//! use pgrotate::secrets::build_secret_store;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_env()?;
//! let store = build_secret_store(&config.secret_store).await?;
//! let database = Arc::new(PostgresDatabase::new(&config.database));
//! let coordinator = RotationCoordinator::new(store, database, &config.rotation)?;
//!
//! let request = RotationRequest::new("db/app", RotationStep::Create);
//! coordinator.handle(&request).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod database;
pub mod errors;
pub mod observability;
pub mod rotation;
pub mod secrets;

pub use errors::{ErrorKind, Result, RotationError};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
