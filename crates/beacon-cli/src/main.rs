//! Beacon CLI
//!
//! Registers this machine as a channel with the configured registry, shows
//! the persisted identity, and runs deferred lookups against remote URLs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod handlers;
mod host;

use handlers::{register::handle_register, resolve::handle_resolve, status::handle_status};
use host::Host;

#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Beacon - channel registration and deferred lookups", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (default: ~/.beacon/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update this machine's channel
    Register {
        /// Send the update even if nothing changed
        #[arg(short, long)]
        force: bool,
    },

    /// Show the persisted channel identity
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch a deferred payload
    Resolve {
        /// Deferred URL
        url: String,

        /// Trigger type reported with the request
        #[arg(long)]
        trigger: Option<String>,

        /// Trigger goal
        #[arg(long, default_value = "1.0")]
        goal: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.unwrap_or_else(host::default_config_path);
    let config = host::load_config(&config_path)?;
    let host = Host::new(config).await?;

    match cli.command {
        Commands::Register { force } => handle_register(&host, force).await?,
        Commands::Status { json } => handle_status(&host, json).await?,
        Commands::Resolve { url, trigger, goal } => {
            handle_resolve(&host, url, trigger, goal).await?;
        }
    }

    Ok(())
}
