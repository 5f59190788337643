//! Backup command handlers
//!
//! Handles backup runs, ledger listing, snapshot display, and restore.

use std::path::Path;

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use colored::*;
use semver::Version;

use flowvault_core::config::Config;
use flowvault_core::domain::backup::{BackupOutcome, BackupRecord};
use flowvault_core::domain::snapshot::BumpLevel;
use flowvault_engine::{BackupError, BackupOptions, RemediationCatalog};

use crate::commands::{build_orchestrator, cancel_on_ctrl_c, load_config};

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Back up the configured workflow now
    Now {
        /// Export and validate only; commit and record nothing
        #[arg(long)]
        dry_run: bool,

        /// Commit a new version even if content is unchanged
        #[arg(long)]
        force: bool,

        /// Version component to bump
        #[arg(long, value_enum, default_value_t = BumpArg::Patch)]
        bump: BumpArg,
    },
    /// List the backup ledger, oldest first
    List {
        /// Print the raw ledger records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one committed snapshot
    Show {
        /// Snapshot version, e.g. 0.1.3
        version: Version,

        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push an old snapshot back to the remote as a new forward version
    Restore {
        /// Snapshot version to restore, e.g. 0.1.3
        version: Version,
    },
}

/// CLI-facing bump levels
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BumpArg {
    Patch,
    Minor,
    Major,
}

impl From<BumpArg> for BumpLevel {
    fn from(value: BumpArg) -> Self {
        match value {
            BumpArg::Patch => BumpLevel::Patch,
            BumpArg::Minor => BumpLevel::Minor,
            BumpArg::Major => BumpLevel::Major,
        }
    }
}

/// Handle backup commands
pub async fn handle_backup_command(command: BackupCommands) -> Result<()> {
    let config = load_config()?;

    match command {
        BackupCommands::Now {
            dry_run,
            force,
            bump,
        } => {
            backup_now(
                &config,
                BackupOptions {
                    dry_run,
                    force,
                    bump: bump.into(),
                },
            )
            .await
        }
        BackupCommands::List { json } => backup_list(&config, json).await,
        BackupCommands::Show { version, json } => backup_show(&config, &version, json).await,
        BackupCommands::Restore { version } => restore(&config, &version).await,
    }
}

async fn backup_now(config: &std::sync::Arc<Config>, opts: BackupOptions) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let cancel = cancel_on_ctrl_c();

    match orchestrator.backup_now(opts, &cancel).await {
        Ok(record) => {
            print_backup_result(&record);
            Ok(())
        }
        Err(BackupError::Cancelled { phase, .. }) => {
            println!(
                "{}",
                format!("Backup cancelled during {phase}; recorded a 'cancelled' ledger entry.")
                    .yellow()
            );
            std::process::exit(130);
        }
        Err(e) => fail_with_remediation(config, &e),
    }
}

async fn backup_list(config: &std::sync::Arc<Config>, json: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let records = orchestrator.backup_list().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No backups recorded yet.".yellow());
        return Ok(());
    }

    println!("{}", format!("{} ledger record(s):", records.len()).bold());
    println!();
    for record in records {
        print_record_summary(&record);
    }
    Ok(())
}

async fn backup_show(config: &std::sync::Arc<Config>, version: &Version, json: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;

    let snapshot = match orchestrator.backup_show(version).await {
        Ok(snapshot) => snapshot,
        Err(e) => return fail_with_remediation(config, &e),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("{}", "Snapshot:".bold());
    println!("  Workflow: {}", snapshot.workflow_id.cyan());
    println!("  Version:  {}", snapshot.version.to_string().cyan());
    println!("  Hash:     {}", snapshot.content_hash.dimmed());
    if let Some(commit) = &snapshot.commit_ref {
        println!("  Commit:   {}", commit.dimmed());
    }
    println!(
        "  Created:  {}",
        snapshot.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("\n{}", "Payload:".bold());
    println!("{}", serde_json::to_string_pretty(&snapshot.payload)?);
    Ok(())
}

async fn restore(config: &std::sync::Arc<Config>, version: &Version) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let cancel = cancel_on_ctrl_c();

    match orchestrator.restore(version, &cancel).await {
        Ok(record) => {
            println!(
                "{}",
                format!("✓ Restored snapshot {version} to the remote").green().bold()
            );
            if let Some(new_version) = record.version() {
                println!(
                    "  Recorded as new version {}",
                    new_version.to_string().cyan()
                );
            }
            Ok(())
        }
        Err(BackupError::Cancelled { phase, .. }) => {
            println!(
                "{}",
                format!("Restore cancelled during {phase}; recorded a 'cancelled' ledger entry.")
                    .yellow()
            );
            std::process::exit(130);
        }
        Err(e) => fail_with_remediation(config, &e),
    }
}

/// Print the outcome of a backup run.
fn print_backup_result(record: &BackupRecord) {
    match &record.outcome {
        BackupOutcome::Succeeded {
            version,
            content_hash,
            commit_ref,
        } => {
            if record.dry_run {
                println!(
                    "{}",
                    format!("Dry run: would create version {version}").yellow().bold()
                );
                println!("  Hash: {}", content_hash.dimmed());
            } else {
                println!("{}", "✓ Backup completed".green().bold());
                println!("  Version: {}", version.to_string().cyan());
                println!("  Hash:    {}", content_hash.dimmed());
                if let Some(commit) = commit_ref {
                    println!("  Commit:  {}", commit.dimmed());
                }
            }
        }
        BackupOutcome::Unchanged { version, .. } => {
            if record.dry_run {
                println!(
                    "{}",
                    format!("Dry run: no upstream change since version {version}").yellow()
                );
            } else {
                println!(
                    "{}",
                    format!("✓ No upstream change since version {version}; commit skipped")
                        .yellow()
                );
                println!("  {}", "Recorded an 'unchanged' ledger entry.".dimmed());
            }
        }
        // backup_now surfaces failures as errors; these outcomes only
        // appear when listing the ledger.
        BackupOutcome::Failed { .. } | BackupOutcome::Cancelled { .. } => {}
    }
}

/// One ledger record, summarized.
fn print_record_summary(record: &BackupRecord) {
    let (symbol, label) = match &record.outcome {
        BackupOutcome::Succeeded { version, .. } => {
            ("✓".green(), format!("v{version}").cyan().to_string())
        }
        BackupOutcome::Unchanged { version, .. } => {
            ("=".yellow(), format!("v{version} unchanged").yellow().to_string())
        }
        BackupOutcome::Failed {
            phase, error_kind, ..
        } => (
            "✗".red(),
            format!("failed during {phase} ({error_kind})").red().to_string(),
        ),
        BackupOutcome::Cancelled { phase } => {
            ("–".yellow(), format!("cancelled during {phase}").to_string())
        }
    };
    println!("  {} {} {}", symbol, label, record.workflow_id.dimmed());
    println!(
        "    {} {}",
        record.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        if record.dry_run {
            "(dry run)".dimmed().to_string()
        } else {
            String::new()
        }
    );
    if let Some(commit) = record.commit_ref() {
        println!("    commit {}", commit.dimmed());
    }
    println!();
}

/// Print the error with its remediation hint, then fail the command.
fn fail_with_remediation(config: &Config, err: &BackupError) -> Result<()> {
    let catalog =
        RemediationCatalog::with_overrides(Path::new(&config.backup_dir).join("remediation.json"));
    eprintln!("{} {}", "✗".red(), err.to_string().red());
    match catalog.lookup(err.kind()) {
        Some(hint) => eprintln!("  {} {hint}", "hint:".yellow()),
        None => eprintln!("  {}", "no known remediation for this failure".dimmed()),
    }
    std::process::exit(1);
}
