//! Momentum engine for bonding-curve token launches
//!
//! # WARNING
//! - This bot trades with real money when wired to an execution adapter.
//! - Most freshly launched tokens go to zero.
//! - Signals are best-effort; fast rugs can gap through any stop.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use curverider::cli::commands;
use curverider::config::Config;

/// Momentum trading engine for newly launched bonding-curve tokens
#[derive(Parser)]
#[command(name = "curverider")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine
    Start {
        /// Log signals without handing them to an execution adapter
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("curverider=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    // Invalid configuration is fatal at startup
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Start { dry_run } => commands::start(&config, dry_run).await,
        Commands::Config => commands::show_config(&config),
    }
}
