//! Audited secret store wrapper.
//!
//! Wraps any [`SecretStore`] and emits one structured event per operation on
//! the `pgrotate::audit` tracing target: operation, secret id, stage, version
//! id and outcome. Secret values are never part of the event.
//!
//! ```rust,ignore
//! let store = AuditedSecretStore::new(InMemorySecretStore::new());
//! let pending = store.get_value("db/app", &VersionStage::Pending).await?;
//! ```

use async_trait::async_trait;

use super::client::{RotationSchedule, SecretDescription, SecretStore, SecretVersion, VersionStage};
use super::error::Result;
use super::types::SecretString;

/// Tracing target for audit events
pub const AUDIT_TARGET: &str = "pgrotate::audit";

/// Audited wrapper for [`SecretStore`] implementations.
pub struct AuditedSecretStore<T: SecretStore> {
    inner: T,
}

impl<T: SecretStore> AuditedSecretStore<T> {
    /// Creates a new audited store around `inner`.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    fn record<V>(
        action: &str,
        secret_id: &str,
        stage: Option<&VersionStage>,
        version_id: Option<&str>,
        result: &Result<V>,
    ) {
        let stage = stage.map(VersionStage::as_label).unwrap_or("-");
        let version_id = version_id.unwrap_or("-");
        match result {
            Ok(_) => tracing::info!(
                target: AUDIT_TARGET,
                action = %action,
                secret_id = %secret_id,
                stage = %stage,
                version_id = %version_id,
                success = true,
                "Secret store operation"
            ),
            Err(e) => tracing::warn!(
                target: AUDIT_TARGET,
                action = %action,
                secret_id = %secret_id,
                stage = %stage,
                version_id = %version_id,
                success = false,
                error = %e,
                "Secret store operation failed"
            ),
        }
    }
}

#[async_trait]
impl<T: SecretStore> SecretStore for AuditedSecretStore<T> {
    async fn describe(&self, secret_id: &str) -> Result<SecretDescription> {
        let result = self.inner.describe(secret_id).await;
        Self::record("secrets.describe", secret_id, None, None, &result);
        result
    }

    async fn get_value(
        &self,
        secret_id: &str,
        stage: &VersionStage,
    ) -> Result<Option<SecretVersion>> {
        let result = self.inner.get_value(secret_id, stage).await;
        let version_id = match &result {
            Ok(Some(version)) => Some(version.version_id.as_str()),
            _ => None,
        };
        Self::record("secrets.get_value", secret_id, Some(stage), version_id, &result);
        result
    }

    async fn put_value(
        &self,
        secret_id: &str,
        version_id: &str,
        value: &SecretString,
        stage: VersionStage,
    ) -> Result<()> {
        let result = self.inner.put_value(secret_id, version_id, value, stage.clone()).await;
        Self::record("secrets.put_value", secret_id, Some(&stage), Some(version_id), &result);
        result
    }

    async fn promote(
        &self,
        secret_id: &str,
        version_id: &str,
        to_stage: VersionStage,
    ) -> Result<()> {
        let result = self.inner.promote(secret_id, version_id, to_stage.clone()).await;
        Self::record("secrets.promote", secret_id, Some(&to_stage), Some(version_id), &result);
        result
    }

    async fn enable_rotation(&self, secret_id: &str, schedule: &RotationSchedule) -> Result<bool> {
        let result = self.inner.enable_rotation(secret_id, schedule).await;
        Self::record("secrets.enable_rotation", secret_id, None, None, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::InMemorySecretStore;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    async fn test_audited_store_logs_operations_without_values() {
        let memory = InMemorySecretStore::new();
        memory.insert_secret("db/app", SecretString::new("{\"password\":\"v1-secret\"}"), true).await;
        let store = AuditedSecretStore::new(memory);

        store
            .put_value(
                "db/app",
                "v2",
                &SecretString::new("{\"password\":\"v2-secret\"}"),
                VersionStage::Pending,
            )
            .await
            .unwrap();
        let pending = store.get_value("db/app", &VersionStage::Pending).await.unwrap();
        assert!(pending.is_some());

        assert!(logs_contain("secrets.put_value"));
        assert!(logs_contain("AWSPENDING"));
        assert!(!logs_contain("v1-secret"));
        assert!(!logs_contain("v2-secret"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_audited_store_logs_enable_rotation() {
        let memory = InMemorySecretStore::new();
        memory.insert_secret("db/app", SecretString::new("{}"), false).await;
        let store = AuditedSecretStore::new(memory);

        let schedule = RotationSchedule { rotation_lambda_arn: None, automatically_after_days: 8 };
        assert!(store.enable_rotation("db/app", &schedule).await.unwrap());
        assert!(logs_contain("secrets.enable_rotation"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_audited_store_logs_failures() {
        let store = AuditedSecretStore::new(InMemorySecretStore::new());
        assert!(store.describe("missing").await.is_err());
        assert!(logs_contain("Secret store operation failed"));
    }
}
