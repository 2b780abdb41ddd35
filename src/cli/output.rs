//! Shared output formatting for CLI commands

use anyhow::{Context, Result};
use serde::Serialize;

use crate::rotation::{RotationOutcome, RotationStatus};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

pub fn print_outcome(outcome: &RotationOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Text => {
            println!("{}", format_outcome(outcome));
            Ok(())
        }
    }
}

pub fn print_status(status: &RotationStatus, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(status),
        OutputFormat::Text => {
            println!("{:<20} {}", "Secret", status.secret_id);
            println!("{:<20} {}", "Rotation enabled", status.rotation_enabled);
            println!("{:<20} {}", "State", status.state);
            println!("{:<20} {}", "AWSCURRENT", status.current_version.as_deref().unwrap_or("-"));
            println!("{:<20} {}", "AWSPENDING", status.pending_version.as_deref().unwrap_or("-"));
            println!("{:<20} {}", "AWSPREVIOUS", status.previous_version.as_deref().unwrap_or("-"));
            Ok(())
        }
    }
}

fn format_outcome(outcome: &RotationOutcome) -> String {
    match (&outcome.error_kind, &outcome.message) {
        (Some(kind), Some(message)) => format!(
            "{:<14} failed ({}{}): {}",
            outcome.step,
            kind,
            if outcome.retryable == Some(true) { ", retryable" } else { "" },
            message
        ),
        _ => format!("{:<14} {}", outcome.step, outcome.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RotationError;
    use crate::rotation::StepOutcome;

    #[test]
    fn test_format_outcome() {
        let ok = RotationOutcome::success("db/app", "createSecret", StepOutcome::AlreadyComplete);
        assert_eq!(format_outcome(&ok), "createSecret   already_complete");

        let err = RotationError::missing_pending("db/app");
        let failed = RotationOutcome::failure("db/app", "setSecret", &err);
        let text = format_outcome(&failed);
        assert!(text.starts_with("setSecret      failed (missing_pending_version)"));
    }
}
