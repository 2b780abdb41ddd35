//! Rotation progress as seen from the secret store.

use serde::Serialize;
use std::fmt;

use crate::secrets::{SecretDescription, VersionStage};

/// Where a rotation stands.
///
/// The store shows `NoPending`, `PendingCreated` and `Rotated`. Whether a
/// pending password was applied or verified is known only to the step that
/// did it, and is reported in that step's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationState {
    NoPending,
    PendingCreated,
    PendingApplied,
    PendingVerified,
    Rotated,
}

impl RotationState {
    /// Classify a secret from its version stages.
    pub fn observe(description: &SecretDescription) -> Self {
        let current = description.version_with(&VersionStage::Current);
        match description.version_with(&VersionStage::Pending) {
            Some(pending) if Some(pending) != current => Self::PendingCreated,
            _ if description.version_with(&VersionStage::Previous).is_some() => Self::Rotated,
            _ => Self::NoPending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoPending => "no_pending",
            Self::PendingCreated => "pending_created",
            Self::PendingApplied => "pending_applied",
            Self::PendingVerified => "pending_verified",
            Self::Rotated => "rotated",
        }
    }
}

impl fmt::Display for RotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
