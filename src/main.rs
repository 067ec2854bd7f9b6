//! Mining Companion - keeps a node's mining wallet in shape
//!
//! Creates or restores the mining wallet, registers its addresses as miner
//! addresses, and periodically moves mined funds to a configured address.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, warn};

use mining_companion::cli::commands;
use mining_companion::config::Config;
use mining_companion::logging;

/// Mining Companion - automation agent for a node's mining wallet
#[derive(Parser)]
#[command(name = "companion")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "companion.toml", env = "COMPANION_CONFIG")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "COMPANION_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the companion
    Start,

    /// Check the health endpoint of a running companion
    Health,

    /// Change the log level of a running companion
    SetLogLevel {
        /// Level or filter directive, e.g. "info" or "mining_companion=trace"
        level: String,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing; the configured level applies once the config is read
    let log_level = match logging::init("info", cli.json_logs) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Some(handle) = &log_level {
        if !logging::env_override() {
            if let Err(e) = handle.set(&config.server.log_level) {
                warn!("Ignoring server.log_level: {}", e);
            }
        }
    }

    // Execute command
    let result = match cli.command {
        Commands::Start => commands::start(&config, log_level).await,
        Commands::Health => commands::health(&config).await,
        Commands::SetLogLevel { level } => commands::set_log_level(&config, &level).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
