//! In-memory versioned secret store.
//!
//! Keeps secret versions and their stage labels in process memory. Used for
//! local dry runs (seeded from a JSON file) and as the store behind the
//! rotation tests. Nothing is persisted.
//!
//! # Seed file format
//!
//! ```json
//! {
//!   "db/app": {
//!     "rotation_enabled": true,
//!     "value": { "host": "localhost", "username": "app", "password": "..." }
//!   }
//! }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::client::{RotationSchedule, SecretDescription, SecretStore, SecretVersion, VersionStage};
use super::error::{Result, SecretsError};
use super::types::SecretString;

#[derive(Debug, Clone)]
struct StoredVersion {
    value: SecretString,
    stages: BTreeSet<VersionStage>,
}

#[derive(Debug, Default)]
struct StoredSecret {
    rotation_enabled: bool,
    versions: HashMap<String, StoredVersion>,
}

impl StoredSecret {
    fn version_with(&self, stage: &VersionStage) -> Option<&str> {
        self.versions
            .iter()
            .find(|(_, version)| version.stages.contains(stage))
            .map(|(id, _)| id.as_str())
    }

    /// Attach `stage` to `version_id` only, handling CURRENT demotion.
    fn move_stage(&mut self, version_id: &str, stage: VersionStage) {
        if stage == VersionStage::Current {
            let demoted = self
                .version_with(&VersionStage::Current)
                .filter(|holder| *holder != version_id)
                .map(str::to_string);

            if let Some(demoted) = demoted {
                for version in self.versions.values_mut() {
                    version.stages.remove(&VersionStage::Previous);
                }
                if let Some(version) = self.versions.get_mut(&demoted) {
                    version.stages.remove(&VersionStage::Current);
                    version.stages.insert(VersionStage::Previous);
                }
            }

            if let Some(version) = self.versions.get_mut(version_id) {
                version.stages.remove(&VersionStage::Pending);
                version.stages.remove(&VersionStage::Previous);
            }
        } else {
            for (id, version) in self.versions.iter_mut() {
                if id != version_id {
                    version.stages.remove(&stage);
                }
            }
        }

        if let Some(version) = self.versions.get_mut(version_id) {
            version.stages.insert(stage);
        }
    }
}

#[derive(Debug, Deserialize)]
struct SeedEntry {
    #[serde(default = "default_rotation_enabled")]
    rotation_enabled: bool,
    value: serde_json::Value,
}

fn default_rotation_enabled() -> bool {
    true
}

/// Versioned secret store held in memory.
///
/// Cloning shares the underlying state, so a test can keep a handle for
/// inspection while the coordinator owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretStore {
    secrets: Arc<RwLock<HashMap<String, StoredSecret>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load secrets from a seed file, each becoming a single CURRENT version.
    pub async fn from_seed_file(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            SecretsError::backend_error(format!(
                "cannot read seed file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let entries: BTreeMap<String, SeedEntry> = serde_json::from_str(&contents)?;

        let store = Self::new();
        for (secret_id, entry) in entries {
            let value = SecretString::new(entry.value.to_string());
            store.insert_secret(&secret_id, value, entry.rotation_enabled).await;
        }

        tracing::info!(path = %path.display(), "Seeded in-memory secret store");
        Ok(store)
    }

    /// Create (or replace) a secret with a single CURRENT version; returns its version id.
    pub async fn insert_secret(
        &self,
        secret_id: &str,
        value: SecretString,
        rotation_enabled: bool,
    ) -> String {
        let version_id = uuid::Uuid::new_v4().to_string();
        let mut stages = BTreeSet::new();
        stages.insert(VersionStage::Current);

        let mut secret = StoredSecret { rotation_enabled, ..Default::default() };
        secret
            .versions
            .insert(version_id.clone(), StoredVersion { value, stages });

        self.secrets.write().await.insert(secret_id.to_string(), secret);
        version_id
    }

    /// Simulate an outage: while set, every operation fails with `ConnectionFailed`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of versions held for a secret, staged or not.
    pub async fn version_count(&self, secret_id: &str) -> usize {
        self.secrets.read().await.get(secret_id).map_or(0, |secret| secret.versions.len())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SecretsError::connection_failed("in-memory store marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn describe(&self, secret_id: &str) -> Result<SecretDescription> {
        self.check_available()?;
        let secrets = self.secrets.read().await;
        let secret = secrets.get(secret_id).ok_or_else(|| SecretsError::not_found(secret_id))?;

        let versions = secret
            .versions
            .iter()
            .map(|(id, version)| (id.clone(), version.stages.iter().cloned().collect()))
            .collect();

        Ok(SecretDescription {
            secret_id: secret_id.to_string(),
            rotation_enabled: secret.rotation_enabled,
            versions,
        })
    }

    async fn get_value(
        &self,
        secret_id: &str,
        stage: &VersionStage,
    ) -> Result<Option<SecretVersion>> {
        self.check_available()?;
        let secrets = self.secrets.read().await;
        let secret = secrets.get(secret_id).ok_or_else(|| SecretsError::not_found(secret_id))?;

        Ok(secret.versions.iter().find(|(_, version)| version.stages.contains(stage)).map(
            |(id, version)| SecretVersion {
                version_id: id.clone(),
                stages: version.stages.iter().cloned().collect(),
                value: version.value.clone(),
            },
        ))
    }

    async fn put_value(
        &self,
        secret_id: &str,
        version_id: &str,
        value: &SecretString,
        stage: VersionStage,
    ) -> Result<()> {
        self.check_available()?;
        let mut secrets = self.secrets.write().await;
        let secret = secrets.get_mut(secret_id).ok_or_else(|| SecretsError::not_found(secret_id))?;

        match secret.versions.get(version_id) {
            Some(existing) if existing.value != *value => {
                return Err(SecretsError::version_conflict(secret_id, version_id));
            }
            Some(_) => {}
            None => {
                secret.versions.insert(
                    version_id.to_string(),
                    StoredVersion { value: value.clone(), stages: BTreeSet::new() },
                );
            }
        }

        secret.move_stage(version_id, stage);
        Ok(())
    }

    async fn promote(
        &self,
        secret_id: &str,
        version_id: &str,
        to_stage: VersionStage,
    ) -> Result<()> {
        self.check_available()?;
        let mut secrets = self.secrets.write().await;
        let secret = secrets.get_mut(secret_id).ok_or_else(|| SecretsError::not_found(secret_id))?;

        if !secret.versions.contains_key(version_id) {
            return Err(SecretsError::not_found(format!("{}@{}", secret_id, version_id)));
        }

        secret.move_stage(version_id, to_stage);
        Ok(())
    }

    /// Only the flag is kept; there is no scheduler behind this store.
    async fn enable_rotation(&self, secret_id: &str, schedule: &RotationSchedule) -> Result<bool> {
        self.check_available()?;
        let mut secrets = self.secrets.write().await;
        let secret = secrets.get_mut(secret_id).ok_or_else(|| SecretsError::not_found(secret_id))?;

        if secret.rotation_enabled {
            return Ok(false);
        }
        secret.rotation_enabled = true;
        tracing::debug!(
            secret_id = %secret_id,
            days = schedule.automatically_after_days,
            "Enabled rotation in memory"
        );
        Ok(true)
    }
}
