//! Flowvault CLI
//!
//! Command-line interface for workflow backup, restore, and diagnostics.

mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};

#[derive(Parser)]
#[command(name = "flowvault", version)]
#[command(about = "Workflow backup, versioning, and diagnostics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    handle_command(cli.command).await
}

/// Initialize logging on stderr. `RUST_LOG` wins when set;
/// `FLOWVAULT_LOG_LEVEL` is the fallback.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let fallback = std::env::var("FLOWVAULT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
