//! # Error Handling
//!
//! Error taxonomy for the rotation core. Adapter layers (`secrets`, `database`)
//! keep their own error enums and are folded into [`RotationError`] at the
//! step-handler boundary, so callers only ever see one machine-readable kind.

pub mod types;

pub use types::{ErrorKind, RotationError};

/// Custom result type for rotation operations
pub type Result<T> = std::result::Result<T, RotationError>;
