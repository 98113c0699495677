// ============================================
// File: crates/streamvpn-server/src/main.rs
// ============================================
//! # StreamVPN Server Entry Point
//!
//! ## Creation Reason
//! Binary wrapper around [`streamvpn_server::Server`]: CLI parsing,
//! logging setup and configuration loading.
//!
//! ## Usage
//! ```bash
//! streamvpn-server start --config /etc/streamvpn/server.toml
//! streamvpn-server validate --config /etc/streamvpn/server.toml
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The server never opens a TUN device, so it needs no privileges
//!   beyond binding its listen port
//! - `RUST_LOG` overrides `[logging] level`
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use streamvpn_server::{Server, ServerConfig};

const DEFAULT_CONFIG_PATH: &str = "/etc/streamvpn/server.toml";

// ============================================
// CLI Definition
// ============================================

/// StreamVPN tunnel server
#[derive(Parser, Debug)]
#[command(name = "streamvpn-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server
    Start {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start { config } => cmd_start(&config).await,
        Commands::Validate { config } => cmd_validate(&config).await,
    };

    if let Err(e) = result {
        init_logging("info");
        error!("{:#}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Loads configuration and runs the server until Ctrl+C.
async fn cmd_start(config_path: &Path) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    init_logging(&config.logging.level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting StreamVPN server");

    let server = Server::new(config);
    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Validates configuration and prints a summary.
async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    init_logging("warn");

    if !config_path.exists() {
        println!("Config file not found: {}", config_path.display());
        println!("   Server will use default values.");
        return Ok(());
    }

    let config = ServerConfig::load(config_path).await?;

    println!("Configuration is valid");
    println!();
    println!("Network:");
    println!("   Listen:     {}", config.network.listen_addr);
    println!();
    println!("VPN:");
    println!("   IP Range:   {}", config.vpn.virtual_ip_range);
    println!("   Range End:  {}", config.vpn.effective_range_end());
    println!("   Gateway:    {}", config.vpn.gateway_ip);
    println!();
    println!("Keyfile:");
    match &config.keyfile.path {
        Some(path) => println!("   Path:       {}", path.display()),
        None => println!("   Path:       (none)"),
    }
    println!();
    println!("Limits:");
    println!("   Max Sessions:       {}", config.limits.max_sessions);
    println!("   Session Timeout:    {}s", config.limits.session_timeout);
    println!("   Idle Timeout:       {}s", config.limits.idle_timeout().as_secs());
    println!("   Handshake Timeout:  {}s", config.limits.handshake_timeout);
    println!();

    Ok(())
}

// ============================================
// Helpers
// ============================================

/// Initializes the tracing subscriber; later calls are no-ops.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Loads config, or returns defaults when the file does not exist.
async fn load_or_default_config(path: &Path) -> anyhow::Result<ServerConfig> {
    if path.exists() {
        Ok(ServerConfig::load(path).await?)
    } else {
        init_logging("info");
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(ServerConfig::default())
    }
}
