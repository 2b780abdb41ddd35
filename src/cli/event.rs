//! Scheduler event wire format.

use serde::{Deserialize, Serialize};

/// One rotation step request as delivered by the scheduler.
///
/// ```json
/// {"SecretId": "arn:...:db/app", "ClientRequestToken": "c0ffee...", "Step": "createSecret"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RotationEvent {
    pub secret_id: String,
    #[serde(default)]
    pub client_request_token: Option<String>,
    pub step: String,
}

impl RotationEvent {
    pub fn from_json(input: &str) -> anyhow::Result<Self> {
        let event: Self = serde_json::from_str(input.trim())
            .map_err(|e| anyhow::anyhow!("Invalid rotation event: {}", e))?;
        if event.secret_id.trim().is_empty() {
            anyhow::bail!("Invalid rotation event: SecretId is empty");
        }
        Ok(event)
    }
}
