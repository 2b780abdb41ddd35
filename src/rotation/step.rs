//! Rotation steps, requests and outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::state::RotationState;
use crate::errors::{ErrorKind, RotationError};

/// One phase of the four-step rotation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RotationStep {
    #[serde(rename = "createSecret")]
    Create,
    #[serde(rename = "setSecret")]
    Set,
    #[serde(rename = "testSecret")]
    Test,
    #[serde(rename = "finishSecret")]
    Finish,
}

impl RotationStep {
    /// Protocol order
    pub const ALL: [RotationStep; 4] = [Self::Create, Self::Set, Self::Test, Self::Finish];

    /// Wire name used by schedulers
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "createSecret",
            Self::Set => "setSecret",
            Self::Test => "testSecret",
            Self::Finish => "finishSecret",
        }
    }

    /// State the rotation is in once this step has succeeded
    pub fn entered_state(&self) -> RotationState {
        match self {
            Self::Create => RotationState::PendingCreated,
            Self::Set => RotationState::PendingApplied,
            Self::Test => RotationState::PendingVerified,
            Self::Finish => RotationState::Rotated,
        }
    }
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RotationStep {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| RotationError::unknown_step(s))
    }
}

/// A single step to run against one secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationRequest {
    pub secret_id: String,
    pub step: RotationStep,
    /// Version id the scheduler assigned to this rotation
    pub client_request_token: Option<String>,
}

impl RotationRequest {
    pub fn new(secret_id: impl Into<String>, step: RotationStep) -> Self {
        Self { secret_id: secret_id.into(), step, client_request_token: None }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.client_request_token = Some(token.into());
        self
    }
}

/// Result of a successful step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step changed state.
    Completed,
    /// The step found its work already done and changed nothing.
    AlreadyComplete,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::AlreadyComplete => "already_complete",
        }
    }
}

/// Machine-readable report of one step invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationOutcome {
    pub secret_id: String,
    pub step: String,
    /// `completed`, `already_complete` or `failed`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl RotationOutcome {
    pub fn success(secret_id: &str, step: &str, outcome: StepOutcome) -> Self {
        Self {
            secret_id: secret_id.to_string(),
            step: step.to_string(),
            status: outcome.as_str().to_string(),
            error_kind: None,
            message: None,
            retryable: None,
        }
    }

    pub fn failure(secret_id: &str, step: &str, error: &RotationError) -> Self {
        Self {
            secret_id: secret_id.to_string(),
            step: step.to_string(),
            status: "failed".to_string(),
            error_kind: Some(error.kind()),
            message: Some(error.to_string()),
            retryable: Some(error.is_retryable()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_names() {
        for step in RotationStep::ALL {
            assert_eq!(step.as_str().parse::<RotationStep>().unwrap(), step);
            assert_eq!(step.to_string(), step.as_str());
        }
    }

    #[test]
    fn test_entered_state_follows_protocol_order() {
        let states: Vec<_> = RotationStep::ALL.iter().map(RotationStep::entered_state).collect();
        assert_eq!(
            states,
            vec![
                RotationState::PendingCreated,
                RotationState::PendingApplied,
                RotationState::PendingVerified,
                RotationState::Rotated,
            ]
        );
    }

    #[test]
    fn test_unknown_step_rejected() {
        let err = "rollbackSecret".parse::<RotationStep>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownStep);
        assert!(!err.is_retryable());
        assert!("createsecret".parse::<RotationStep>().is_err());
    }

    #[test]
    fn test_step_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&RotationStep::Finish).unwrap(), "\"finishSecret\"");
        let step: RotationStep = serde_json::from_str("\"setSecret\"").unwrap();
        assert_eq!(step, RotationStep::Set);
    }

    #[test]
    fn test_outcome_json_shape() {
        let ok = RotationOutcome::success("db/app", "createSecret", StepOutcome::Completed);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json.get("error_kind").is_none());
        assert!(ok.is_success());

        let err = RotationError::missing_pending("db/app");
        let failed = RotationOutcome::failure("db/app", "setSecret", &err);
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error_kind"], "missing_pending_version");
        assert_eq!(json["retryable"], false);
    }
}
