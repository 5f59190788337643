//! Workflow command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;

use flowvault_client::{WorkflowClient, WorkflowSource};

use crate::commands::load_config;

/// Workflow subcommands
#[derive(Subcommand)]
pub enum WorkflowCommands {
    /// List workflows visible on the remote system
    List {
        /// Show only active workflows
        #[arg(long)]
        active: bool,

        /// Maximum number of entries to fetch
        #[arg(long, default_value = "100")]
        limit: usize,
    },
}

/// Handle workflow commands
pub async fn handle_workflow_command(command: WorkflowCommands) -> Result<()> {
    match command {
        WorkflowCommands::List { active, limit } => list_workflows(active, limit).await,
    }
}

async fn list_workflows(active_only: bool, limit: usize) -> Result<()> {
    let config = load_config()?;
    let client = WorkflowClient::new(&config);

    let mut workflows = client.list_workflows(limit).await?;
    if active_only {
        workflows.retain(|w| w.active);
    }

    if workflows.is_empty() {
        println!("{}", "No workflows found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} workflow(s):", workflows.len()).bold()
    );
    println!();
    for workflow in workflows {
        let state = if workflow.active {
            "active".green()
        } else {
            "inactive".dimmed()
        };
        println!("  {} {} [{}]", "▸".cyan(), workflow.name.bold(), state);
        println!("    ID: {}", workflow.id.dimmed());
        if let Some(updated) = &workflow.updated_at {
            println!("    Updated: {}", updated.dimmed());
        }
        println!();
    }
    Ok(())
}
