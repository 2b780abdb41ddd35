//! Rotation coordinator: the single entry point for a scheduler.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

use super::handlers::StepHandlers;
use super::password::PasswordGenerator;
use super::state::RotationState;
use super::step::{RotationOutcome, RotationRequest, RotationStep, StepOutcome};
use crate::config::{AdminCredentialSource, RotationConfig};
use crate::database::CredentialDatabase;
use crate::errors::{Result, RotationError};
use crate::observability::StepMetrics;
use crate::secrets::fields::DEFAULT_POSTGRES_PORT;
use crate::secrets::{RotationSchedule, SecretDescription, SecretStore, VersionStage};

/// Snapshot of a secret's rotation progress.
#[derive(Debug, Clone, Serialize)]
pub struct RotationStatus {
    pub secret_id: String,
    pub rotation_enabled: bool,
    pub state: RotationState,
    pub current_version: Option<String>,
    pub pending_version: Option<String>,
    pub previous_version: Option<String>,
}

impl RotationStatus {
    fn from_description(description: &SecretDescription) -> Self {
        let version = |stage: VersionStage| description.version_with(&stage).map(str::to_string);
        Self {
            secret_id: description.secret_id.clone(),
            rotation_enabled: description.rotation_enabled,
            state: RotationState::observe(description),
            current_version: version(VersionStage::Current),
            pending_version: version(VersionStage::Pending),
            previous_version: version(VersionStage::Previous),
        }
    }
}

/// Dispatches rotation steps to their handlers.
///
/// Holds no rotation state of its own; every call starts by describing the
/// secret, so any number of coordinators (or processes) may serve the same
/// secret.
pub struct RotationCoordinator {
    handlers: StepHandlers,
    require_rotation_enabled: bool,
    metrics: StepMetrics,
}

impl RotationCoordinator {
    pub fn new(
        store: Arc<dyn SecretStore>,
        database: Arc<dyn CredentialDatabase>,
        config: &RotationConfig,
    ) -> Result<Self> {
        Self::with_default_port(store, database, config, DEFAULT_POSTGRES_PORT)
    }

    /// Like [`RotationCoordinator::new`], with the port assumed for secrets that omit one.
    pub fn with_default_port(
        store: Arc<dyn SecretStore>,
        database: Arc<dyn CredentialDatabase>,
        config: &RotationConfig,
        default_port: u16,
    ) -> Result<Self> {
        let generator = PasswordGenerator::from_config(config)?;
        let admin = config.admin_source();
        match &admin {
            AdminCredentialSource::SameSecret => {
                tracing::info!("Password changes authenticate with the rotated secret")
            }
            AdminCredentialSource::AdminSecret(id) => {
                tracing::info!(admin_secret_id = %id, "Password changes authenticate with admin secret")
            }
        }

        Ok(Self {
            handlers: StepHandlers::new(store, database, generator, admin, default_port),
            require_rotation_enabled: config.require_rotation_enabled,
            metrics: StepMetrics::new(),
        })
    }

    /// Run one step.
    pub async fn handle(&self, request: &RotationRequest) -> Result<StepOutcome> {
        let span = crate::rotation_span!(request.secret_id, request.step);
        let started = Instant::now();

        let result = self.dispatch(request).instrument(span.clone()).await;

        let label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(e) => e.kind().as_str(),
        };
        self.metrics.record_step(request.step.as_str(), label, started.elapsed());

        span.in_scope(|| match &result {
            Ok(outcome) => tracing::info!(
                outcome = outcome.as_str(),
                state = %request.step.entered_state(),
                "Rotation step succeeded"
            ),
            Err(e) => tracing::warn!(
                error_kind = %e.kind(),
                retryable = e.is_retryable(),
                error = %e,
                "Rotation step failed"
            ),
        });
        result
    }

    /// Run one step named by its wire name and report the result.
    pub async fn handle_named(
        &self,
        secret_id: &str,
        step: &str,
        client_request_token: Option<&str>,
    ) -> RotationOutcome {
        let result = match step.parse::<RotationStep>() {
            Ok(parsed) => {
                let request = RotationRequest {
                    secret_id: secret_id.to_string(),
                    step: parsed,
                    client_request_token: client_request_token.map(str::to_string),
                };
                self.handle(&request).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => RotationOutcome::success(secret_id, step, outcome),
            Err(e) => RotationOutcome::failure(secret_id, step, &e),
        }
    }

    /// Run createSecret, setSecret, testSecret and finishSecret in order,
    /// stopping at the first failure.
    pub async fn run_all(
        &self,
        secret_id: &str,
        client_request_token: Option<&str>,
    ) -> Result<Vec<(RotationStep, StepOutcome)>> {
        let (completed, failure) = self.run_steps(secret_id, client_request_token).await;
        match failure {
            Some((_, e)) => Err(e),
            None => Ok(completed),
        }
    }

    /// Like `run_all`, but reports every completed step and the failed one.
    pub async fn run_report(
        &self,
        secret_id: &str,
        client_request_token: Option<&str>,
    ) -> Vec<RotationOutcome> {
        let (completed, failure) = self.run_steps(secret_id, client_request_token).await;
        let mut report: Vec<_> = completed
            .into_iter()
            .map(|(step, outcome)| RotationOutcome::success(secret_id, step.as_str(), outcome))
            .collect();
        if let Some((step, e)) = failure {
            report.push(RotationOutcome::failure(secret_id, step.as_str(), &e));
        }
        report
    }

    async fn run_steps(
        &self,
        secret_id: &str,
        client_request_token: Option<&str>,
    ) -> (Vec<(RotationStep, StepOutcome)>, Option<(RotationStep, RotationError)>) {
        let mut completed = Vec::with_capacity(RotationStep::ALL.len());
        for step in RotationStep::ALL {
            let request = RotationRequest {
                secret_id: secret_id.to_string(),
                step,
                client_request_token: client_request_token.map(str::to_string),
            };
            match self.handle(&request).await {
                Ok(outcome) => completed.push((step, outcome)),
                Err(e) => return (completed, Some((step, e))),
            }
        }
        (completed, None)
    }

    /// Turn on scheduled rotation for a secret; `false` if it was already on.
    pub async fn enable_rotation(
        &self,
        secret_id: &str,
        schedule: &RotationSchedule,
    ) -> Result<bool> {
        let enabled = self.handlers.enable_rotation(secret_id, schedule).await?;
        if enabled {
            tracing::info!(
                secret_id = %secret_id,
                days = schedule.automatically_after_days,
                "Rotation enabled"
            );
        } else {
            tracing::info!(secret_id = %secret_id, "Rotation already enabled");
        }
        Ok(enabled)
    }

    /// Describe the secret's rotation progress without changing anything.
    pub async fn status(&self, secret_id: &str) -> Result<RotationStatus> {
        let description = self.handlers.describe(secret_id).await?;
        Ok(RotationStatus::from_description(&description))
    }

    async fn dispatch(&self, request: &RotationRequest) -> Result<StepOutcome> {
        let secret_id = request.secret_id.as_str();
        let description = self.handlers.describe(secret_id).await?;

        if self.require_rotation_enabled && !description.rotation_enabled {
            return Err(RotationError::rotation_not_enabled(secret_id));
        }

        if let Some(token) = request.client_request_token.as_deref() {
            if let Some(outcome) = check_token(&description, request.step, token)? {
                return Ok(outcome);
            }
        }

        match request.step {
            RotationStep::Create => {
                self.handlers
                    .create_secret(secret_id, request.client_request_token.as_deref())
                    .await
            }
            RotationStep::Set => self.handlers.set_secret(secret_id).await,
            RotationStep::Test => self.handlers.test_secret(secret_id).await,
            RotationStep::Finish => self.handlers.finish_secret(secret_id).await,
        }
    }
}

/// Reconcile a scheduler token with the store's stages.
///
/// `Some(outcome)` short-circuits the step.
fn check_token(
    description: &SecretDescription,
    step: RotationStep,
    token: &str,
) -> Result<Option<StepOutcome>> {
    let secret_id = description.secret_id.as_str();

    if description.version_with(&VersionStage::Current) == Some(token) {
        tracing::info!(version_id = %token, "Version is already AWSCURRENT");
        return Ok(Some(StepOutcome::AlreadyComplete));
    }

    match (description.version_with(&VersionStage::Pending), step) {
        (Some(pending), _) if pending == token => Ok(None),
        (None, RotationStep::Create) => Ok(None),
        (Some(pending), _) => Err(RotationError::inconsistent(
            secret_id,
            format!("AWSPENDING is on version {} but the request names {}", pending, token),
        )),
        (None, RotationStep::Finish) => Err(RotationError::inconsistent(
            secret_id,
            format!("version {} is neither AWSPENDING nor AWSCURRENT", token),
        )),
        (None, _) => Err(RotationError::missing_pending(secret_id)),
    }
}
