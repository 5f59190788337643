//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod backup;
mod config;
mod status;
mod workflow;

pub use backup::BackupCommands;
pub use config::ConfigCommands;
pub use status::StatusCommands;
pub use workflow::WorkflowCommands;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;
use tokio_util::sync::CancellationToken;

use flowvault_client::{VcsClient, WorkflowClient};
use flowvault_core::config::Config;
use flowvault_engine::{BackupOrchestrator, SnapshotStore};

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Backup operations and history
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// System status and health checks
    Status {
        #[command(subcommand)]
        command: StatusCommands,
    },
    /// Workflow operations on the remote system
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommands,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Backup { command } => backup::handle_backup_command(command).await,
        Commands::Status { command } => status::handle_status_command(command).await,
        Commands::Workflow { command } => workflow::handle_workflow_command(command).await,
        Commands::Config { command } => config::handle_config_command(command).await,
    }
}

/// Load and validate configuration from the environment.
pub(crate) fn load_config() -> Result<Arc<Config>> {
    let config = Config::from_env().context(
        "configuration is not usable; run 'flowvault config init' to generate a template",
    )?;
    Ok(Arc::new(config))
}

/// Wire the real clients and store into an orchestrator.
pub(crate) fn build_orchestrator(config: &Arc<Config>) -> Result<BackupOrchestrator> {
    let source = Arc::new(WorkflowClient::new(config));
    let vcs = Arc::new(VcsClient::new(config).context("building version-control client")?);
    let store = SnapshotStore::open(&config.backup_dir, config.backup_retention_count)
        .context("opening snapshot store")?;
    Ok(BackupOrchestrator::new(
        config.clone(),
        source,
        vcs,
        store,
    ))
}

/// Token that trips on Ctrl-C so in-flight backups cancel cleanly at the
/// next I/O boundary instead of dying mid-commit.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trip = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trip.cancel();
        }
    });
    token
}
