//! AWS Secrets Manager store.
//!
//! Maps the [`SecretStore`] operations onto `DescribeSecret`,
//! `GetSecretValue`, `PutSecretValue`, `UpdateSecretVersionStage` and
//! `RotateSecret`.
//! Credentials come from the default AWS provider chain
//! (environment, shared profile, instance/task role).
//!
//! Only compiled with the `aws` feature.

use async_trait::async_trait;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_secretsmanager::types::RotationRulesType;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use std::time::Duration;

use super::client::{RotationSchedule, SecretDescription, SecretStore, SecretVersion, VersionStage};
use super::error::{Result, SecretsError};
use super::types::SecretString;
use crate::config::SecretStoreConfig;

/// Secret store backed by AWS Secrets Manager.
#[derive(Clone)]
pub struct AwsSecretStore {
    client: SecretsManagerClient,
}

impl std::fmt::Debug for AwsSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSecretStore").finish_non_exhaustive()
    }
}

impl AwsSecretStore {
    /// Create a client from the store configuration.
    ///
    /// `region` and `endpoint_url` override the environment; the endpoint
    /// override is meant for LocalStack-style test setups.
    pub async fn new(config: &SecretStoreConfig) -> Result<Self> {
        let timeouts = aws_config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.operation_timeout_seconds))
            .build();

        let mut loader =
            aws_config::defaults(aws_config::BehaviorVersion::latest()).timeout_config(timeouts);

        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }

        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let client = SecretsManagerClient::new(&sdk_config);

        tracing::info!(
            backend = "aws_secrets_manager",
            region = ?config.region,
            endpoint_override = config.endpoint_url.is_some(),
            "Initialized AWS Secrets Manager store"
        );

        Ok(Self { client })
    }
}

fn map_sdk_error<E, R>(secret_id: &str, err: SdkError<E, R>) -> SecretsError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            return SecretsError::connection_failed(message);
        }
        _ => {}
    }

    match err.code() {
        Some("ResourceNotFoundException") => SecretsError::not_found(secret_id),
        Some("ResourceExistsException") => SecretsError::backend_error(message),
        Some("AccessDeniedException")
        | Some("UnrecognizedClientException")
        | Some("ExpiredTokenException") => SecretsError::authentication_failed(message),
        Some("InvalidParameterException") | Some("InvalidRequestException") => {
            SecretsError::invalid_value(message)
        }
        Some("InternalServiceError") | Some("ThrottlingException") => {
            SecretsError::connection_failed(message)
        }
        _ => SecretsError::backend_error(message),
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    #[tracing::instrument(skip(self), fields(backend = "aws"))]
    async fn describe(&self, secret_id: &str) -> Result<SecretDescription> {
        let output = self
            .client
            .describe_secret()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| map_sdk_error(secret_id, e))?;

        let versions = output
            .version_ids_to_stages()
            .map(|map| {
                map.iter()
                    .map(|(version_id, stages)| {
                        (
                            version_id.clone(),
                            stages.iter().map(|label| VersionStage::from_label(label)).collect(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(SecretDescription {
            secret_id: secret_id.to_string(),
            rotation_enabled: output.rotation_enabled().unwrap_or(false),
            versions,
        })
    }

    #[tracing::instrument(skip(self), fields(backend = "aws"))]
    async fn get_value(
        &self,
        secret_id: &str,
        stage: &VersionStage,
    ) -> Result<Option<SecretVersion>> {
        let result = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .version_stage(stage.as_label())
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                return match map_sdk_error(secret_id, e) {
                    // No version carries the stage
                    SecretsError::NotFound { .. } => Ok(None),
                    other => Err(other),
                };
            }
        };

        let version_id = output
            .version_id()
            .ok_or_else(|| SecretsError::backend_error("GetSecretValue returned no version id"))?
            .to_string();
        let value = output.secret_string().ok_or_else(|| {
            SecretsError::invalid_value("secret does not contain string data")
        })?;

        Ok(Some(SecretVersion {
            version_id,
            stages: output.version_stages().iter().map(|l| VersionStage::from_label(l)).collect(),
            value: SecretString::new(value),
        }))
    }

    #[tracing::instrument(skip(self, value), fields(backend = "aws"))]
    async fn put_value(
        &self,
        secret_id: &str,
        version_id: &str,
        value: &SecretString,
        stage: VersionStage,
    ) -> Result<()> {
        let result = self
            .client
            .put_secret_value()
            .secret_id(secret_id)
            .client_request_token(version_id)
            .secret_string(value.expose_secret())
            .version_stages(stage.as_label())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            // Same token, different content
            Err(e) if e.code() == Some("ResourceExistsException") => {
                Err(SecretsError::version_conflict(secret_id, version_id))
            }
            Err(e) => Err(map_sdk_error(secret_id, e)),
        }
    }

    #[tracing::instrument(skip(self), fields(backend = "aws"))]
    async fn promote(
        &self,
        secret_id: &str,
        version_id: &str,
        to_stage: VersionStage,
    ) -> Result<()> {
        let description = self.describe(secret_id).await?;
        if description.stages_of(version_id).is_none() {
            return Err(SecretsError::not_found(format!("{}@{}", secret_id, version_id)));
        }

        let holder = description.version_with(&to_stage).map(str::to_string);
        if holder.as_deref() != Some(version_id) {
            self.client
                .update_secret_version_stage()
                .secret_id(secret_id)
                .version_stage(to_stage.as_label())
                .move_to_version_id(version_id)
                .set_remove_from_version_id(holder)
                .send()
                .await
                .map_err(|e| map_sdk_error(secret_id, e))?;
        }

        // Secrets Manager leaves AWSPENDING on the promoted version
        if to_stage == VersionStage::Current
            && description.has_stage(version_id, &VersionStage::Pending)
        {
            self.client
                .update_secret_version_stage()
                .secret_id(secret_id)
                .version_stage(VersionStage::Pending.as_label())
                .remove_from_version_id(version_id)
                .send()
                .await
                .map_err(|e| map_sdk_error(secret_id, e))?;
        }

        Ok(())
    }

    /// `RotateSecret` also starts a first rotation right away.
    #[tracing::instrument(skip(self), fields(backend = "aws"))]
    async fn enable_rotation(&self, secret_id: &str, schedule: &RotationSchedule) -> Result<bool> {
        if self.describe(secret_id).await?.rotation_enabled {
            return Ok(false);
        }

        let lambda_arn = schedule.rotation_lambda_arn.as_deref().ok_or_else(|| {
            SecretsError::invalid_value("a rotation function ARN is required to enable rotation")
        })?;
        let rules = RotationRulesType::builder()
            .automatically_after_days(i64::from(schedule.automatically_after_days))
            .build();

        self.client
            .rotate_secret()
            .secret_id(secret_id)
            .rotation_lambda_arn(lambda_arn)
            .rotation_rules(rules)
            .send()
            .await
            .map_err(|e| map_sdk_error(secret_id, e))?;

        tracing::info!(
            secret_id = %secret_id,
            days = schedule.automatically_after_days,
            "Enabled rotation"
        );
        Ok(true)
    }
}
