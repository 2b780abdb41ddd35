//! # Configuration Management
//!
//! Settings come from `PGROTATE_*` environment variables (a `.env` file is
//! loaded first by the binary) and are checked with `validator` before use.

pub mod settings;

pub use settings::{
    AdminCredentialSource, AppConfig, DatabaseConfig, ObservabilityConfig, RotationConfig,
    SecretStoreBackend, SecretStoreConfig, SslMode, ENV_PREFIX,
};
