//! rcs-relay: relay server binary

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rcs_relay::{RelayConfig, RelayServer};

#[derive(Parser)]
#[command(name = "rcs-relay")]
#[command(about = "Relay for consent-gated remote control sessions")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "RCS_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    listen_addr: Option<std::net::SocketAddr>,

    /// Log filter, overrides the config file and RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = RelayConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.listen_addr {
        config.listen_addr = addr;
    }

    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rcs-relay server");

    let server = RelayServer::new(config)?;
    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("Relay server stopped");
    Ok(())
}
