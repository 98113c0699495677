// ============================================
// File: crates/streamvpn-client/src/main.rs
// ============================================
//! # StreamVPN Client Entry Point
//!
//! ## Creation Reason
//! Binary wrapper around [`streamvpn_client::ClientReconnector`]: CLI
//! parsing, logging setup, TUN creation and Ctrl+C handling.
//!
//! ## Usage
//! ```bash
//! streamvpn-client connect --config /etc/streamvpn/client.toml
//! streamvpn-client connect --server vpn.example.com:2002 --static-address 10.0.0.42
//! streamvpn-client validate --config /etc/streamvpn/client.toml
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `connect` needs root or `CAP_NET_ADMIN` to create the TUN device
//! - Command-line overrides are applied before validation
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use streamvpn_client::ClientConfig;

const DEFAULT_CONFIG_PATH: &str = "/etc/streamvpn/client.toml";

// ============================================
// CLI Definition
// ============================================

/// StreamVPN tunnel client
#[derive(Parser, Debug)]
#[command(name = "streamvpn-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring the tunnel up and keep it up until Ctrl+C
    Connect {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Server address (host:port), overrides the config file
        #[arg(short, long)]
        server: Option<String>,

        /// Request this virtual address instead of a dynamic one
        #[arg(long)]
        static_address: Option<Ipv4Addr>,
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
        Commands::Connect {
            config,
            server,
            static_address,
        } => cmd_connect(&config, server, static_address).await,
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

/// Applies overrides and runs the tunnel.
async fn cmd_connect(
    config_path: &Path,
    server: Option<String>,
    static_address: Option<Ipv4Addr>,
) -> anyhow::Result<()> {
    let mut config = load_or_default_config(config_path).await?;
    if let Some(server) = server {
        config.server.address = server;
    }
    if static_address.is_some() {
        config.tunnel.static_address = static_address;
    }
    config.validate()?;

    init_logging(&config.logging.level);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.server.target(),
        "Starting StreamVPN client"
    );

    run_tunnel(config).await
}

#[cfg(target_os = "linux")]
async fn run_tunnel(config: ClientConfig) -> anyhow::Result<()> {
    use std::sync::Arc;

    use streamvpn_client::ClientReconnector;
    use streamvpn_transport::{LinuxTun, TunDevice};
    use tokio::sync::broadcast;
    use tracing::warn;

    let tun = Arc::new(LinuxTun::create(config.tunnel.tun_config())?);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                let _ = shutdown_tx.send(());
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    let mut client = ClientReconnector::new(config, Arc::clone(&tun))?;
    let result = client.run(shutdown_rx).await;

    if let Err(e) = tun.down().await {
        warn!(error = %e, "Failed to bring TUN device down");
    }

    result?;
    info!("Client shutdown complete");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn run_tunnel(_config: ClientConfig) -> anyhow::Result<()> {
    anyhow::bail!("TUN devices are only supported on Linux")
}

/// Validates configuration and prints a summary.
async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    init_logging("warn");

    if !config_path.exists() {
        println!("Config file not found: {}", config_path.display());
        println!("   Client will use default values.");
        return Ok(());
    }

    let config = ClientConfig::load(config_path).await?;

    println!("Configuration is valid");
    println!();
    println!("Server:");
    println!("   Address:    {}", config.server.target());
    println!("   Identity:   {}", config.identity());
    println!();
    println!("Tunnel:");
    println!("   Device:     {}", config.tunnel.device_name);
    println!("   MTU:        {}", config.tunnel.mtu);
    match config.tunnel.static_address {
        Some(addr) => println!("   Address:    {addr} (static)"),
        None => println!("   Address:    dynamic"),
    }
    println!("   Netmask:    {}", config.tunnel.netmask);
    println!();
    println!("Reconnect:");
    println!("   Backoff:    {}ms .. {}ms", config.reconnect.initial_backoff_ms, config.reconnect.max_backoff_ms);
    match config.reconnect.attempt_limit() {
        Some(limit) => println!("   Attempts:   {limit}"),
        None => println!("   Attempts:   unlimited"),
    }
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
///
/// Validation is left to the caller so command-line overrides apply first.
async fn load_or_default_config(path: &Path) -> anyhow::Result<ClientConfig> {
    if !path.exists() {
        init_logging("info");
        info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(ClientConfig::default());
    }

    let content = tokio::fs::read_to_string(path).await?;
    let config: ClientConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
    Ok(config)
}
