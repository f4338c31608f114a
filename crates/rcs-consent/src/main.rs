use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rcs_consent::{BridgeClient, ConsentSurface, TerminalPrompter};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rcs-consent")]
#[command(about = "Consent surface - asks the local user before remote control starts")]
struct Args {
    /// Base URL of the agent's loopback consent endpoint
    #[arg(long, env = "RCS_CONSENT_URL", default_value = "http://127.0.0.1:47115")]
    endpoint: String,

    /// Bearer token; read from the bridge directory when omitted
    #[arg(long, env = "RCS_CONSENT_TOKEN")]
    token: Option<String>,

    /// Directory holding the agent-generated token file
    #[arg(long, env = "RCS_BRIDGE_DIR")]
    bridge_dir: Option<PathBuf>,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they do not interleave with the prompt
    let filter = EnvFilter::try_new(format!("rcs_consent={}", args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("rcs_consent=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let token = match args.token {
        Some(token) => token,
        None => {
            let dir = args
                .bridge_dir
                .or_else(rcs_core::consent::default_bridge_dir)
                .context("no --token or --bridge-dir given and no default data directory")?;
            BridgeClient::read_token(&dir)
                .await
                .context("no --token given and the agent token file is unreadable")?
        }
    };

    let client = BridgeClient::new(&args.endpoint, token)?;
    let surface = ConsentSurface::new(client, TerminalPrompter::new())
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms.max(100)));

    info!(endpoint = %args.endpoint, "Waiting for control requests");
    surface
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("rcs-consent stopped");
    Ok(())
}
