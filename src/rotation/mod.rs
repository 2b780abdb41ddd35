//! # Credential Rotation
//!
//! The four-step rotation protocol:
//!
//! | Step | Effect |
//! |---|---|
//! | `createSecret` | store a new password as the PENDING version |
//! | `setSecret` | apply the PENDING password to the database user |
//! | `testSecret` | log in with the PENDING credentials |
//! | `finishSecret` | promote PENDING to CURRENT |
//!
//! Every step is idempotent and re-reads the secret store before acting. The
//! store's version stages are the only rotation state; the
//! [`RotationCoordinator`] keeps none.

pub mod coordinator;
pub mod handlers;
pub mod password;
pub mod state;
pub mod step;

pub use coordinator::{RotationCoordinator, RotationStatus};
pub use handlers::StepHandlers;
pub use password::{is_valid_password, PasswordGenerator};
pub use state::RotationState;
pub use step::{RotationOutcome, RotationRequest, RotationStep, StepOutcome};
