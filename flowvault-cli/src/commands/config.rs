//! Configuration command handlers
//!
//! Template generation, masked display, and standalone validation.
//! These commands must work even when the configuration is broken, so
//! they load the environment without eager validation.

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use colored::*;

use flowvault_core::config::Config;

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write an environment template with every recognized setting
    Init {
        /// Where to write the template
        #[arg(long, short, default_value = ".env.template")]
        path: String,

        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
    /// Display the current configuration with secrets masked
    Show {
        /// Print secrets unmasked (use with caution)
        #[arg(long)]
        show_secrets: bool,
    },
    /// Validate the configuration and report every violation
    Validate,
}

/// Handle configuration commands
pub async fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Init { path, force } => init(&path, force),
        ConfigCommands::Show { show_secrets } => show(show_secrets),
        ConfigCommands::Validate => validate(),
    }
}

fn init(path: &str, force: bool) -> Result<()> {
    if std::path::Path::new(path).exists() && !force {
        bail!("{path} already exists; pass --force to overwrite");
    }
    std::fs::write(path, Config::env_template())
        .with_context(|| format!("writing template to {path}"))?;
    println!("{}", format!("✓ Wrote configuration template to {path}").green().bold());
    println!(
        "  {}",
        "Fill in your values, export them, then run 'flowvault config validate'.".dimmed()
    );
    Ok(())
}

fn show(show_secrets: bool) -> Result<()> {
    let config = Config::from_env_unvalidated();
    let secret = |value: &str| {
        if show_secrets {
            value.to_string()
        } else {
            mask(value)
        }
    };

    println!("{}", "Configuration:".bold());
    println!("  Remote URL:        {}", config.remote_base_url);
    println!("  Remote API key:    {}", secret(&config.remote_api_key));
    println!("  API key header:    {}", config.remote_api_key_header);
    println!("  Workflow ID:       {}", display_or_unset(&config.remote_workflow_id));
    println!("  VCS repo:          {}", display_or_unset(&config.vcs_repo_url));
    println!("  VCS token:         {}", secret(&config.vcs_token));
    println!("  VCS branch:        {}", config.vcs_branch);
    println!("  Retry attempts:    {}", config.retry_max_attempts);
    println!("  Retry base delay:  {}ms", config.retry_base_delay_ms);
    println!("  Log level:         {}", config.log_level);
    println!("  Retention count:   {}", config.backup_retention_count);
    println!("  Backup dir:        {}", config.backup_dir);

    if !show_secrets {
        println!();
        println!(
            "  {}",
            "Secrets are masked; pass --show-secrets to print them.".dimmed()
        );
    }
    Ok(())
}

fn validate() -> Result<()> {
    let config = Config::from_env_unvalidated();
    match config.validate() {
        Ok(()) => {
            println!("{}", "✓ Configuration is valid".green().bold());
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "{}",
                format!("✗ {} configuration violation(s):", e.violations.len())
                    .red()
                    .bold()
            );
            for violation in &e.violations {
                eprintln!("  - {violation}");
            }
            std::process::exit(1);
        }
    }
}

/// Mask a secret, keeping a short recognizable prefix.
fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return "(not set)".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{prefix}****")
    }
}

fn display_or_unset(value: &str) -> String {
    if value.is_empty() {
        "(not set)".to_string()
    } else {
        value.to_string()
    }
}
