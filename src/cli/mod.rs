//! # Command Line Interface
//!
//! `pgrotate` commands: single steps, full runs, status, scheduler events,
//! enabling scheduled rotation and password generation.

pub mod event;
pub mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use crate::config::{AppConfig, SecretStoreBackend};
use crate::database::{CredentialDatabase, InMemoryDatabase, PostgresDatabase};
use crate::observability::{init_logging, log_config_info};
use crate::rotation::{PasswordGenerator, RotationCoordinator, RotationOutcome};
use crate::secrets::{build_secret_store, DatabaseSecret, SecretStore, VersionStage};
use event::RotationEvent;
use output::{print_outcome, print_status, OutputFormat};

#[derive(Parser)]
#[command(name = "pgrotate")]
#[command(about = "PostgreSQL credential rotation against a versioned secret store")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Apply password changes to an in-memory database instead of PostgreSQL
    /// (memory secret store only)
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single rotation step
    Rotate {
        /// Secret identifier (name or ARN)
        secret_id: String,

        /// Step name: createSecret, setSecret, testSecret or finishSecret
        #[arg(long)]
        step: String,

        /// Version id for this rotation
        #[arg(long)]
        token: Option<String>,
    },

    /// Run all four steps in order, stopping at the first failure
    Run {
        secret_id: String,

        #[arg(long)]
        token: Option<String>,
    },

    /// Show the secret's version stages and rotation state
    Status { secret_id: String },

    /// Turn on scheduled rotation; does nothing if it is already on
    EnableRotation {
        secret_id: String,

        /// Rotation function ARN (defaults to PGROTATE_ROTATION_LAMBDA_ARN)
        #[arg(long)]
        lambda_arn: Option<String>,

        /// Days between rotations (defaults to PGROTATE_ROTATION_DAYS)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=1000))]
        days: Option<u32>,
    },

    /// Read a scheduler event from stdin and write the outcome as JSON
    HandleEvent,

    /// Print a password generated with the configured policy
    GeneratePassword {
        /// Override the configured length
        #[arg(long)]
        length: Option<usize>,
    },
}

/// Run CLI commands. A failed rotation step yields `ExitCode::FAILURE`.
pub async fn run_cli() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    config.validate()?;
    initialise_logging(&config);

    match cli.command {
        Commands::GeneratePassword { length } => {
            let length = length.unwrap_or(config.rotation.password_length);
            let generator =
                PasswordGenerator::new(length, config.rotation.require_each_character_class)?;
            println!("{}", generator.generate().expose_secret());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { secret_id } => {
            let coordinator = build_coordinator(&config, cli.dry_run, &secret_id).await?;
            let status = coordinator.status(&secret_id).await?;
            print_status(&status, cli.output)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Rotate { secret_id, step, token } => {
            let coordinator = build_coordinator(&config, cli.dry_run, &secret_id).await?;
            let outcome = coordinator.handle_named(&secret_id, &step, token.as_deref()).await;
            finish(&outcome, cli.output)
        }
        Commands::Run { secret_id, token } => {
            let coordinator = build_coordinator(&config, cli.dry_run, &secret_id).await?;
            let outcomes = coordinator.run_report(&secret_id, token.as_deref()).await;
            for outcome in &outcomes {
                print_outcome(outcome, cli.output)?;
            }
            Ok(exit_code(outcomes.iter().all(RotationOutcome::is_success)))
        }
        Commands::EnableRotation { secret_id, lambda_arn, days } => {
            let mut schedule = config.rotation.schedule();
            if lambda_arn.is_some() {
                schedule.rotation_lambda_arn = lambda_arn;
            }
            if let Some(days) = days {
                schedule.automatically_after_days = days;
            }
            let coordinator = build_coordinator(&config, cli.dry_run, &secret_id).await?;
            let enabled = coordinator.enable_rotation(&secret_id, &schedule).await?;
            if enabled {
                println!(
                    "Rotation enabled for {} every {} days",
                    secret_id, schedule.automatically_after_days
                );
            } else {
                println!("Rotation already enabled for {}", secret_id);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::HandleEvent => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("Failed to read event from stdin")?;
            let event = RotationEvent::from_json(&input)?;

            let coordinator = build_coordinator(&config, cli.dry_run, &event.secret_id).await?;
            let outcome = coordinator
                .handle_named(&event.secret_id, &event.step, event.client_request_token.as_deref())
                .await;
            finish(&outcome, OutputFormat::Json)
        }
    }
}

/// Print an outcome and map it to the process exit code.
fn finish(outcome: &RotationOutcome, format: OutputFormat) -> anyhow::Result<ExitCode> {
    print_outcome(outcome, format)?;
    Ok(exit_code(outcome.is_success()))
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn build_coordinator(
    config: &AppConfig,
    dry_run: bool,
    secret_id: &str,
) -> anyhow::Result<RotationCoordinator> {
    let store = build_secret_store(&config.secret_store)
        .await
        .context("Failed to initialise secret store")?;

    let database: Arc<dyn CredentialDatabase> = if dry_run {
        if config.secret_store.backend != SecretStoreBackend::Memory {
            anyhow::bail!("--dry-run requires the memory secret store backend");
        }
        Arc::new(dry_run_database(store.as_ref(), config, secret_id).await?)
    } else {
        Arc::new(PostgresDatabase::new(&config.database))
    };

    let coordinator = RotationCoordinator::with_default_port(
        store,
        database,
        &config.rotation,
        config.database.default_port,
    )?;
    Ok(coordinator)
}

/// In-memory database whose roles match the secrets' CURRENT versions.
async fn dry_run_database(
    store: &dyn SecretStore,
    config: &AppConfig,
    secret_id: &str,
) -> anyhow::Result<InMemoryDatabase> {
    let mut database = InMemoryDatabase::new();

    let Some(current) = store.get_value(secret_id, &VersionStage::Current).await? else {
        return Ok(database);
    };
    let target = DatabaseSecret::parse(secret_id, &current.value)?;
    database = database.with_role(target.username(), target.password().expose_secret());

    if let Some(admin_id) = &config.rotation.admin_secret_id {
        if let Some(admin) = store.get_value(admin_id, &VersionStage::Current).await? {
            let params = DatabaseSecret::parse_admin(admin_id, &admin.value, &target)?;
            database =
                database.with_superuser(&params.username, params.password.expose_secret());
        }
    }

    tracing::info!(secret_id = %secret_id, "Dry run: using in-memory database");
    Ok(database)
}

fn initialise_logging(config: &AppConfig) {
    // A subscriber installed earlier (tests, embedding process) keeps its place
    if let Err(e) = init_logging(&config.observability) {
        tracing::debug!(error = %e, "Logging already initialised");
    }
    log_config_info(config);
}
