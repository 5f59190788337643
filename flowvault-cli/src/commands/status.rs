//! Status command handlers

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;

use flowvault_client::{VcsClient, WorkflowClient};
use flowvault_core::domain::report::{DiagnosticReport, ProbeStatus};
use flowvault_engine::{DiagnosticsEngine, RemediationCatalog};

use crate::commands::load_config;

/// Status subcommands
#[derive(Subcommand)]
pub enum StatusCommands {
    /// Run all health probes and print the aggregated report
    System {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Handle status commands
pub async fn handle_status_command(command: StatusCommands) -> Result<()> {
    match command {
        StatusCommands::System { json } => system(json).await,
    }
}

async fn system(json: bool) -> Result<()> {
    let config = load_config()?;
    let source = Arc::new(WorkflowClient::new(&config));
    let vcs = Arc::new(VcsClient::new(&config).context("building version-control client")?);
    let catalog =
        RemediationCatalog::with_overrides(Path::new(&config.backup_dir).join("remediation.json"));
    let engine = DiagnosticsEngine::new(config, source, vcs, catalog);

    let report = engine.status_system().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall() == ProbeStatus::Failing {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &DiagnosticReport) {
    println!("{}", "System diagnostics".bold());
    println!("{}", "─".repeat(60).dimmed());

    for probe in &report.probes {
        let symbol = match probe.status {
            ProbeStatus::Healthy => "✓".green(),
            ProbeStatus::Degraded => "!".yellow(),
            ProbeStatus::Failing => "✗".red(),
        };
        println!("  {} {:<16} {}", symbol, probe.name, probe.message);
        if let Some(hint) = &probe.remediation {
            println!("      {} {hint}", "hint:".yellow());
        }
    }

    println!("{}", "─".repeat(60).dimmed());
    let overall = report.overall();
    let rendered = match overall {
        ProbeStatus::Healthy => "healthy".green().bold(),
        ProbeStatus::Degraded => "degraded".yellow().bold(),
        ProbeStatus::Failing => "failing".red().bold(),
    };
    println!("Overall: {rendered}");
}
