//! The four rotation steps.
//!
//! Every step starts from what the secret store says now. Nothing is carried
//! over from an earlier step or an earlier invocation, so any step can be
//! re-run after a crash or a scheduler retry.

use std::sync::Arc;

use crate::config::AdminCredentialSource;
use crate::database::{
    close_quietly, AdminCommand, ConnectParams, CredentialDatabase, DatabaseError,
};
use crate::errors::{Result, RotationError};
use crate::secrets::{
    DatabaseSecret, RotationSchedule, SecretDescription, SecretStore, SecretVersion,
    SecretsError, VersionStage,
};

use super::password::PasswordGenerator;
use super::step::StepOutcome;

/// Step implementations sharing one store, one database and one policy.
pub struct StepHandlers {
    store: Arc<dyn SecretStore>,
    database: Arc<dyn CredentialDatabase>,
    generator: PasswordGenerator,
    admin: AdminCredentialSource,
    default_port: u16,
}

impl StepHandlers {
    pub fn new(
        store: Arc<dyn SecretStore>,
        database: Arc<dyn CredentialDatabase>,
        generator: PasswordGenerator,
        admin: AdminCredentialSource,
        default_port: u16,
    ) -> Self {
        Self { store, database, generator, admin, default_port }
    }

    pub(crate) async fn describe(&self, secret_id: &str) -> Result<SecretDescription> {
        self.store.describe(secret_id).await.map_err(|e| RotationError::from_store(secret_id, e))
    }

    async fn read(&self, secret_id: &str, stage: &VersionStage) -> Result<Option<SecretVersion>> {
        self.store
            .get_value(secret_id, stage)
            .await
            .map_err(|e| RotationError::from_store(secret_id, e))
    }

    async fn read_current(&self, secret_id: &str) -> Result<SecretVersion> {
        self.read(secret_id, &VersionStage::Current).await?.ok_or_else(|| {
            RotationError::inconsistent(secret_id, "secret has no AWSCURRENT version")
        })
    }

    async fn read_pending(&self, secret_id: &str) -> Result<SecretVersion> {
        self.read(secret_id, &VersionStage::Pending)
            .await?
            .ok_or_else(|| RotationError::missing_pending(secret_id))
    }

    fn parse(&self, secret_id: &str, version: &SecretVersion) -> Result<DatabaseSecret> {
        DatabaseSecret::parse_with_default_port(secret_id, &version.value, self.default_port)
    }

    /// Ensure a PENDING version holds a new password.
    ///
    /// An existing PENDING version is never replaced: `setSecret` may already
    /// have applied its password to the database. Without a token the new
    /// version id is derived from the CURRENT version id, so concurrent calls
    /// all write the same version.
    pub async fn create_secret(&self, secret_id: &str, token: Option<&str>) -> Result<StepOutcome> {
        let current_version = self.read_current(secret_id).await?;
        let current = self.parse(secret_id, &current_version)?;

        if let Some(pending) = self.read_staged(secret_id, &current_version.version_id).await? {
            tracing::info!(
                version_id = %pending.version_id,
                "PENDING version already exists, keeping its password"
            );
            return Ok(StepOutcome::AlreadyComplete);
        }

        let version_id = match token {
            Some(token) => token.to_string(),
            None => derived_version_id(secret_id, &current_version.version_id),
        };
        let payload = current.with_password(self.generator.generate()).to_secret_string()?;

        match self.store.put_value(secret_id, &version_id, &payload, VersionStage::Pending).await {
            Ok(()) => {
                tracing::info!(version_id = %version_id, "Created PENDING version");
                Ok(StepOutcome::Completed)
            }
            Err(SecretsError::VersionConflict { .. }) => {
                self.resolve_version_conflict(secret_id, &version_id, &current_version.version_id)
                    .await
            }
            Err(e) => Err(RotationError::from_store(secret_id, e)),
        }
    }

    /// `version_id` already exists with another password.
    async fn resolve_version_conflict(
        &self,
        secret_id: &str,
        version_id: &str,
        current_version_id: &str,
    ) -> Result<StepOutcome> {
        match self.read_staged(secret_id, current_version_id).await? {
            // A concurrent createSecret won the write
            Some(pending) => {
                tracing::info!(
                    version_id = %pending.version_id,
                    "PENDING version already exists, keeping its password"
                );
                Ok(StepOutcome::AlreadyComplete)
            }
            None => {
                // Lost its PENDING label; keep the stored password rather than a new one
                self.store
                    .promote(secret_id, version_id, VersionStage::Pending)
                    .await
                    .map_err(|e| RotationError::from_store(secret_id, e))?;
                tracing::info!(version_id = %version_id, "Restored PENDING label on existing version");
                Ok(StepOutcome::Completed)
            }
        }
    }

    /// PENDING version, unless the label sits on CURRENT.
    async fn read_staged(
        &self,
        secret_id: &str,
        current_version_id: &str,
    ) -> Result<Option<SecretVersion>> {
        Ok(self
            .read(secret_id, &VersionStage::Pending)
            .await?
            .filter(|pending| pending.version_id != current_version_id))
    }

    /// Make the database accept the PENDING password.
    pub async fn set_secret(&self, secret_id: &str) -> Result<StepOutcome> {
        let pending_version = self.read_pending(secret_id).await?;
        let current_version = self.read_current(secret_id).await?;
        if pending_version.version_id == current_version.version_id {
            return Ok(StepOutcome::AlreadyComplete);
        }

        let pending = self.parse(secret_id, &pending_version)?;
        let current = self.parse(secret_id, &current_version)?;
        if !pending.same_identity(&current) {
            return Err(RotationError::inconsistent(
                secret_id,
                format!(
                    "PENDING names '{}' on {}:{} but CURRENT names '{}' on {}:{}",
                    pending.username(),
                    pending.host(),
                    pending.port(),
                    current.username(),
                    current.host(),
                    current.port()
                ),
            ));
        }

        let admin_params = match &self.admin {
            AdminCredentialSource::SameSecret => {
                if self.login_succeeds(&pending.connect_params()).await? {
                    tracing::info!(user = %pending.username(), "PENDING password already active");
                    return Ok(StepOutcome::AlreadyComplete);
                }
                current.connect_params()
            }
            AdminCredentialSource::AdminSecret(admin_id) => {
                let admin_version =
                    self.read(admin_id, &VersionStage::Current).await?.ok_or_else(|| {
                        RotationError::invalid_secret(
                            admin_id.as_str(),
                            "admin secret has no AWSCURRENT version",
                        )
                    })?;
                DatabaseSecret::parse_admin(admin_id, &admin_version.value, &pending)?
            }
        };

        let mut connection = self.database.connect(&admin_params).await.map_err(|e| match e {
            DatabaseError::Authentication { .. } => RotationError::command(
                pending.username(),
                format!("administrative login as '{}' rejected: {}", admin_params.username, e),
            ),
            other => RotationError::database_unavailable(other),
        })?;

        let command = AdminCommand::set_password(pending.username(), pending.password().clone());
        let result = connection.execute(&command).await;
        close_quietly(connection).await;

        match result {
            Ok(()) => {
                tracing::info!(
                    user = %pending.username(),
                    admin_user = %admin_params.username,
                    "Applied PENDING password to database"
                );
                Ok(StepOutcome::Completed)
            }
            Err(e) if e.is_transient() => Err(RotationError::database_unavailable(e)),
            Err(e) => Err(RotationError::command(pending.username(), e.to_string())),
        }
    }

    /// Log in with the PENDING credentials and run a trivial query.
    pub async fn test_secret(&self, secret_id: &str) -> Result<StepOutcome> {
        let pending_version = self.read_pending(secret_id).await?;
        let pending = self.parse(secret_id, &pending_version)?;

        let mut connection =
            self.database.connect(&pending.connect_params()).await.map_err(|e| match e {
                DatabaseError::Authentication { .. } => {
                    RotationError::verification(secret_id, e.to_string())
                }
                other => RotationError::database_unavailable(other),
            })?;

        let result = connection.ping().await;
        close_quietly(connection).await;

        match result {
            Ok(()) => {
                tracing::info!(user = %pending.username(), "PENDING credentials verified");
                Ok(StepOutcome::Completed)
            }
            Err(e) if e.is_transient() => Err(RotationError::database_unavailable(e)),
            Err(e) => Err(RotationError::verification(secret_id, e.to_string())),
        }
    }

    /// Promote PENDING to CURRENT; the old CURRENT becomes PREVIOUS.
    pub async fn finish_secret(&self, secret_id: &str) -> Result<StepOutcome> {
        let description = self.describe(secret_id).await?;
        let current = description
            .version_with(&VersionStage::Current)
            .ok_or_else(|| RotationError::inconsistent(secret_id, "secret has no AWSCURRENT version"))?;

        let Some(pending) = description.version_with(&VersionStage::Pending) else {
            return Ok(StepOutcome::AlreadyComplete);
        };

        if pending == current {
            // Stray label on the live version; promoting clears it
            self.promote(secret_id, current).await?;
            return Ok(StepOutcome::AlreadyComplete);
        }

        self.promote(secret_id, pending).await?;
        tracing::info!(
            version_id = %pending,
            previous_version_id = %current,
            "Promoted PENDING version to AWSCURRENT"
        );
        Ok(StepOutcome::Completed)
    }

    pub(crate) async fn enable_rotation(
        &self,
        secret_id: &str,
        schedule: &RotationSchedule,
    ) -> Result<bool> {
        self.store
            .enable_rotation(secret_id, schedule)
            .await
            .map_err(|e| RotationError::from_store(secret_id, e))
    }

    async fn promote(&self, secret_id: &str, version_id: &str) -> Result<()> {
        self.store
            .promote(secret_id, version_id, VersionStage::Current)
            .await
            .map_err(|e| RotationError::from_store(secret_id, e))
    }

    async fn login_succeeds(&self, params: &ConnectParams) -> Result<bool> {
        match self.database.connect(params).await {
            Ok(connection) => {
                close_quietly(connection).await;
                Ok(true)
            }
            Err(DatabaseError::Authentication { .. }) => Ok(false),
            Err(e) => Err(RotationError::database_unavailable(e)),
        }
    }
}

/// Version id for a token-less createSecret: the same for every call made
/// against one CURRENT version.
fn derived_version_id(secret_id: &str, current_version_id: &str) -> String {
    let name = format!("{}/{}", secret_id, current_version_id);
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryDatabase;
    use crate::errors::ErrorKind;
    use crate::secrets::{InMemorySecretStore, SecretString};

    const SECRET: &str = "db/app";

    async fn fixture(admin: AdminCredentialSource) -> (InMemorySecretStore, InMemoryDatabase, StepHandlers) {
        let store = InMemorySecretStore::new();
        store
            .insert_secret(
                SECRET,
                SecretString::new(
                    serde_json::json!({
                        "engine": "postgres",
                        "host": "localhost",
                        "username": "app",
                        "password": "original-password"
                    })
                    .to_string(),
                ),
                true,
            )
            .await;
        store
            .insert_secret(
                "db/admin",
                SecretString::new(
                    serde_json::json!({"username": "postgres", "password": "root"}).to_string(),
                ),
                false,
            )
            .await;

        let database = InMemoryDatabase::new()
            .with_role("app", "original-password")
            .with_superuser("postgres", "root");

        let handlers = StepHandlers::new(
            Arc::new(store.clone()),
            Arc::new(database.clone()),
            PasswordGenerator::default(),
            admin,
            5432,
        );
        (store, database, handlers)
    }

    async fn pending_password(store: &InMemorySecretStore) -> String {
        let pending = store.get_value(SECRET, &VersionStage::Pending).await.unwrap().unwrap();
        let secret = DatabaseSecret::parse(SECRET, &pending.value).unwrap();
        secret.password().expose_secret().to_string()
    }

    #[tokio::test]
    async fn test_create_copies_fields_and_keeps_existing_pending() {
        let (store, _, handlers) = fixture(AdminCredentialSource::SameSecret).await;

        assert_eq!(handlers.create_secret(SECRET, None).await.unwrap(), StepOutcome::Completed);
        let first = pending_password(&store).await;

        let pending = store.get_value(SECRET, &VersionStage::Pending).await.unwrap().unwrap();
        let parsed = DatabaseSecret::parse(SECRET, &pending.value).unwrap();
        assert_eq!(parsed.field("engine"), Some(&serde_json::json!("postgres")));
        assert_ne!(first, "original-password");

        assert_eq!(
            handlers.create_secret(SECRET, None).await.unwrap(),
            StepOutcome::AlreadyComplete
        );
        assert_eq!(pending_password(&store).await, first);
    }

    #[tokio::test]
    async fn test_create_uses_token_as_version_id() {
        let (store, _, handlers) = fixture(AdminCredentialSource::SameSecret).await;
        handlers.create_secret(SECRET, Some("token-1")).await.unwrap();

        let description = store.describe(SECRET).await.unwrap();
        assert_eq!(description.version_with(&VersionStage::Pending), Some("token-1"));
    }

    #[tokio::test]
    async fn test_create_without_token_derives_version_from_current() {
        let (store, _, handlers) = fixture(AdminCredentialSource::SameSecret).await;
        let current = store.describe(SECRET).await.unwrap();
        let current = current.version_with(&VersionStage::Current).unwrap().to_string();

        handlers.create_secret(SECRET, None).await.unwrap();

        let description = store.describe(SECRET).await.unwrap();
        let expected = derived_version_id(SECRET, &current);
        assert_eq!(description.version_with(&VersionStage::Pending), Some(expected.as_str()));
        assert_ne!(derived_version_id(SECRET, "other-current"), expected);
        assert_ne!(derived_version_id("db/other", &current), expected);
    }

    #[tokio::test]
    async fn test_create_restores_lost_pending_label() {
        let (store, _, handlers) = fixture(AdminCredentialSource::SameSecret).await;
        let description = store.describe(SECRET).await.unwrap();
        let current = description.version_with(&VersionStage::Current).unwrap().to_string();

        handlers.create_secret(SECRET, None).await.unwrap();
        let first = pending_password(&store).await;
        let staged = store.describe(SECRET).await.unwrap();
        let staged = staged.version_with(&VersionStage::Pending).unwrap().to_string();

        // Stray label moved onto CURRENT; the staged version keeps its value
        store.promote(SECRET, &current, VersionStage::Pending).await.unwrap();

        assert_eq!(handlers.create_secret(SECRET, None).await.unwrap(), StepOutcome::Completed);
        let description = store.describe(SECRET).await.unwrap();
        assert_eq!(description.version_with(&VersionStage::Pending), Some(staged.as_str()));
        assert_eq!(description.stages_of(&current), Some(&[VersionStage::Current][..]));
        assert_eq!(pending_password(&store).await, first);
    }

    #[tokio::test]
    async fn test_set_without_pending_fails() {
        let (_, _, handlers) = fixture(AdminCredentialSource::SameSecret).await;
        let err = handlers.set_secret(SECRET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingPendingVersion);
    }

    #[tokio::test]
    async fn test_set_same_secret_mode_is_idempotent() {
        let (store, database, handlers) = fixture(AdminCredentialSource::SameSecret).await;
        handlers.create_secret(SECRET, None).await.unwrap();
        let candidate = pending_password(&store).await;

        assert_eq!(handlers.set_secret(SECRET).await.unwrap(), StepOutcome::Completed);
        assert!(database.authenticates("app", &candidate));

        assert_eq!(handlers.set_secret(SECRET).await.unwrap(), StepOutcome::AlreadyComplete);
        assert!(database.authenticates("app", &candidate));
        assert_eq!(database.commands_executed().len(), 1);
        assert_eq!(database.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_set_admin_mode_reapplies_same_password() {
        let admin = AdminCredentialSource::AdminSecret("db/admin".to_string());
        let (store, database, handlers) = fixture(admin).await;
        handlers.create_secret(SECRET, None).await.unwrap();
        let candidate = pending_password(&store).await;

        handlers.set_secret(SECRET).await.unwrap();
        handlers.set_secret(SECRET).await.unwrap();
        assert!(database.authenticates("app", &candidate));
        assert_eq!(database.commands_executed(), vec!["app".to_string(), "app".to_string()]);
        assert_eq!(database.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_set_command_failure_is_not_success() {
        let (_, database, handlers) = fixture(AdminCredentialSource::SameSecret).await;
        handlers.create_secret(SECRET, None).await.unwrap();
        database.fail_commands(true);

        let err = handlers.set_secret(SECRET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommandExecution);
        assert!(database.authenticates("app", "original-password"));
        assert_eq!(database.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_set_rejected_admin_login_is_command_execution() {
        let admin = AdminCredentialSource::AdminSecret("db/admin".to_string());
        let (store, _, handlers) = fixture(admin).await;
        store
            .insert_secret(
                "db/admin",
                SecretString::new(
                    serde_json::json!({"username": "postgres", "password": "stale"}).to_string(),
                ),
                false,
            )
            .await;
        handlers.create_secret(SECRET, None).await.unwrap();

        let err = handlers.set_secret(SECRET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommandExecution);
    }

    #[tokio::test]
    async fn test_set_refuses_identity_change() {
        let (store, _, handlers) = fixture(AdminCredentialSource::SameSecret).await;
        let other_user = SecretString::new(
            serde_json::json!({"host": "localhost", "username": "intruder", "password": "x"})
                .to_string(),
        );
        store.put_value(SECRET, "v2", &other_user, VersionStage::Pending).await.unwrap();

        let err = handlers.set_secret(SECRET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InconsistentState);
    }

    #[tokio::test]
    async fn test_unreachable_database_is_retryable() {
        let (_, database, handlers) = fixture(AdminCredentialSource::SameSecret).await;
        handlers.create_secret(SECRET, None).await.unwrap();
        database.set_reachable(false);

        let err = handlers.set_secret(SECRET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatabaseUnavailable);
        assert!(err.is_retryable());

        let err = handlers.test_secret(SECRET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatabaseUnavailable);
    }

    #[tokio::test]
    async fn test_test_fails_before_set() {
        let (_, database, handlers) = fixture(AdminCredentialSource::SameSecret).await;
        handlers.create_secret(SECRET, None).await.unwrap();

        let err = handlers.test_secret(SECRET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialVerification);
        assert_eq!(database.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_finish_promotes_and_is_idempotent() {
        let (store, _, handlers) = fixture(AdminCredentialSource::SameSecret).await;
        let before = store.describe(SECRET).await.unwrap();
        let original = before.version_with(&VersionStage::Current).unwrap().to_string();

        handlers.create_secret(SECRET, Some("v2")).await.unwrap();
        assert_eq!(handlers.finish_secret(SECRET).await.unwrap(), StepOutcome::Completed);

        let after = store.describe(SECRET).await.unwrap();
        assert_eq!(after.version_with(&VersionStage::Current), Some("v2"));
        assert_eq!(after.version_with(&VersionStage::Previous), Some(original.as_str()));
        assert_eq!(after.version_with(&VersionStage::Pending), None);

        assert_eq!(handlers.finish_secret(SECRET).await.unwrap(), StepOutcome::AlreadyComplete);
        assert_eq!(store.describe(SECRET).await.unwrap(), after);
    }

    #[tokio::test]
    async fn test_finish_clears_pending_label_on_current() {
        let (store, _, handlers) = fixture(AdminCredentialSource::SameSecret).await;
        let description = store.describe(SECRET).await.unwrap();
        let current = description.version_with(&VersionStage::Current).unwrap().to_string();
        let value = store.get_value(SECRET, &VersionStage::Current).await.unwrap().unwrap().value;
        store.put_value(SECRET, &current, &value, VersionStage::Pending).await.unwrap();

        assert_eq!(handlers.finish_secret(SECRET).await.unwrap(), StepOutcome::AlreadyComplete);
        let description = store.describe(SECRET).await.unwrap();
        assert_eq!(description.stages_of(&current), Some(&[VersionStage::Current][..]));
    }

    #[tokio::test]
    async fn test_missing_secret_is_invalid() {
        let (_, _, handlers) = fixture(AdminCredentialSource::SameSecret).await;
        let err = handlers.create_secret("db/missing", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSecret);
    }
}
