//! Blockyard Daemon - Minecraft server project builds and local runs
//!
//! The daemon provides:
//! - REST API for projects, builds, and runs
//! - Workspace reconciliation before each run
//! - Live run status and log streaming

use blockyard_daemon::{DaemonConfig, Server};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Blockyard Daemon CLI
#[derive(Parser)]
#[command(name = "blockyardd")]
#[command(about = "Blockyard Daemon - build and run Minecraft server projects", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BLOCKYARD_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, env = "BLOCKYARD_LISTEN_ADDR")]
    listen: Option<String>,

    /// Data directory, overrides the configuration file
    #[arg(short, long, env = "BLOCKYARD_DATA_DIR")]
    data_dir: Option<String>,

    /// Log level
    #[arg(long, env = "BLOCKYARD_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "BLOCKYARD_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {}", listen, e))?;
    }
    if let Some(data_dir) = cli.data_dir {
        config.paths.data_dir = data_dir.into();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        runtime = %config.runtime.container_binary,
        "Starting Blockyard daemon"
    );

    // Create and run server
    let server = Server::new(config).await?;
    server.run().await?;
    Ok(())
}
