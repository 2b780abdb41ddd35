//! Versioned secret store abstraction.
//!
//! The rotation steps read and write credential material exclusively through
//! the [`SecretStore`] trait:
//! - **describe**: rotation flag and version → stage mapping
//! - **get_value**: the value of the version carrying a stage
//! - **put_value**: store a new version under a stage
//! - **promote**: move a stage onto a version
//! - **enable_rotation**: turn on scheduled rotation for a secret
//!
//! # Backends
//!
//! - [`InMemorySecretStore`]: process-local, for dry runs and tests
//! - `AwsSecretStore`: AWS Secrets Manager (feature `aws`)
//!
//! Any backend can be wrapped in [`AuditedSecretStore`] to get one audit
//! event per operation.
//!
//! # Security Considerations
//!
//! - Secret values travel as [`SecretString`] and are never logged
//! - Errors carry secret ids and version ids, never payloads
//! - No values are cached between calls; every step re-reads the store

pub mod audited;
#[cfg(feature = "aws")]
pub mod aws;
pub mod client;
pub mod error;
pub mod fields;
pub mod memory;
pub mod types;

use std::sync::Arc;

pub use audited::AuditedSecretStore;
#[cfg(feature = "aws")]
pub use aws::AwsSecretStore;
pub use client::{RotationSchedule, SecretDescription, SecretStore, SecretVersion, VersionStage};
pub use error::{Result, SecretsError};
pub use fields::DatabaseSecret;
pub use memory::InMemorySecretStore;
pub use types::SecretString;

use crate::config::{SecretStoreBackend, SecretStoreConfig};

/// Build the configured secret store, wrapped for auditing.
pub async fn build_secret_store(config: &SecretStoreConfig) -> Result<Arc<dyn SecretStore>> {
    match config.backend {
        SecretStoreBackend::Memory => {
            let store = match &config.seed_file {
                Some(path) => InMemorySecretStore::from_seed_file(path).await?,
                None => InMemorySecretStore::new(),
            };
            Ok(Arc::new(AuditedSecretStore::new(store)))
        }
        #[cfg(feature = "aws")]
        SecretStoreBackend::Aws => {
            let store = AwsSecretStore::new(config).await?;
            Ok(Arc::new(AuditedSecretStore::new(store)))
        }
        #[cfg(not(feature = "aws"))]
        SecretStoreBackend::Aws => Err(SecretsError::backend_error(
            "the 'aws' backend requires building with --features aws",
        )),
    }
}
