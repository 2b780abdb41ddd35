//! Versioned secret store trait and types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::Result;
use super::types::SecretString;

/// Label attached to an immutable version of a secret.
///
/// The canonical labels follow the AWS Secrets Manager names
/// (`AWSCURRENT`, `AWSPENDING`, `AWSPREVIOUS`); the short forms
/// `CURRENT`, `PENDING` and `PREVIOUS` are accepted when parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VersionStage {
    Current,
    Pending,
    Previous,
    /// Any label this crate does not interpret
    Other(String),
}

impl VersionStage {
    /// Label as stored in the backend
    pub fn as_label(&self) -> &str {
        match self {
            Self::Current => "AWSCURRENT",
            Self::Pending => "AWSPENDING",
            Self::Previous => "AWSPREVIOUS",
            Self::Other(label) => label,
        }
    }

    /// Parse a backend label, never failing
    pub fn from_label(label: &str) -> Self {
        match label {
            "AWSCURRENT" | "CURRENT" => Self::Current,
            "AWSPENDING" | "PENDING" => Self::Pending,
            "AWSPREVIOUS" | "PREVIOUS" => Self::Previous,
            other => Self::Other(other.to_string()),
        }
    }
}

impl FromStr for VersionStage {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_label(s))
    }
}

impl fmt::Display for VersionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

impl Serialize for VersionStage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_label())
    }
}

impl<'de> Deserialize<'de> for VersionStage {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

/// Metadata about a secret, without any values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecretDescription {
    /// Stable secret identifier (ARN or name)
    pub secret_id: String,

    /// Whether the store has rotation turned on for this secret
    pub rotation_enabled: bool,

    /// Version id → stages attached to it
    pub versions: BTreeMap<String, Vec<VersionStage>>,
}

impl SecretDescription {
    /// Version id currently carrying `stage`, if any
    pub fn version_with(&self, stage: &VersionStage) -> Option<&str> {
        self.versions
            .iter()
            .find(|(_, stages)| stages.contains(stage))
            .map(|(version_id, _)| version_id.as_str())
    }

    /// Stages attached to `version_id`; `None` if the version is unknown
    pub fn stages_of(&self, version_id: &str) -> Option<&[VersionStage]> {
        self.versions.get(version_id).map(Vec::as_slice)
    }

    /// Whether `version_id` carries `stage`
    pub fn has_stage(&self, version_id: &str, stage: &VersionStage) -> bool {
        self.stages_of(version_id).is_some_and(|stages| stages.contains(stage))
    }
}

/// A single version of a secret, with its value.
#[derive(Debug, Clone)]
pub struct SecretVersion {
    pub version_id: String,
    pub stages: Vec<VersionStage>,
    pub value: SecretString,
}

/// How often the store should run rotations once they are turned on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationSchedule {
    /// Function invoked for each scheduled rotation; required by AWS
    pub rotation_lambda_arn: Option<String>,
    pub automatically_after_days: u32,
}

/// Versioned secret store consumed by the rotation steps.
///
/// The store is the serialization point of the rotation protocol: the
/// `CURRENT`/`PENDING` labels it holds are the only authoritative rotation
/// state. Implementations MUST NOT log secret values.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Rotation flag and version staging for a secret.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::NotFound`](super::SecretsError::NotFound) if the secret doesn't exist
    async fn describe(&self, secret_id: &str) -> Result<SecretDescription>;

    /// Value of the version carrying `stage`, or `None` if no version carries it.
    async fn get_value(&self, secret_id: &str, stage: &VersionStage)
        -> Result<Option<SecretVersion>>;

    /// Store `value` as version `version_id` and attach `stage` to it.
    ///
    /// Writing the same value under an existing version id is a no-op apart
    /// from attaching the stage; different content under an existing id fails
    /// with [`SecretsError::VersionConflict`](super::SecretsError::VersionConflict).
    async fn put_value(
        &self,
        secret_id: &str,
        version_id: &str,
        value: &SecretString,
        stage: VersionStage,
    ) -> Result<()>;

    /// Move `to_stage` onto `version_id`.
    ///
    /// Promoting to [`VersionStage::Current`] demotes the previous holder to
    /// [`VersionStage::Previous`] and removes [`VersionStage::Pending`] from
    /// the promoted version, all as one operation from the caller's view.
    async fn promote(&self, secret_id: &str, version_id: &str, to_stage: VersionStage)
        -> Result<()>;

    /// Turn on scheduled rotation for one secret.
    ///
    /// Returns `false` without changing anything when rotation is already on.
    async fn enable_rotation(&self, secret_id: &str, schedule: &RotationSchedule) -> Result<bool>;
}
