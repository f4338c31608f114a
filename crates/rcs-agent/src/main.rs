use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rcs_agent::consent_api::{self, ConsentApiState};
use rcs_agent::relay_link::RelayLink;
use rcs_agent::{config, platform, EndpointRuntime, RuntimeLimits};
use rcs_core::{ConsentBridge, FileStore, SessionManager, SystemClock};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rcs-agent")]
#[command(about = "Remote control endpoint agent - consent-gated session owner")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "RCS_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overrides the configuration
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => config::AgentConfig::load_from_file(path)?,
        None => config::AgentConfig::load_from_env()?,
    };

    // Initialize tracing
    let level = args.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    // full directives pass through, a bare level applies to our crates
    let filter = if level.contains('=') {
        EnvFilter::new(level)
    } else {
        EnvFilter::new(format!(
            "rcs_agent={level},rcs_core={level},rcs_platform_win={level},rcs_platform_linux={level},tower_http=warn"
        ))
    };
    let (file_layer, _log_guard) = match &config.log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "rcs-agent.log".to_string());
            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                ),
                Some(guard),
            )
        }
        None => (None, None),
    };
    let (plain_layer, json_layer) = if config.log_json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(plain_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    info!(
        client_id = %config.client_id,
        relay = %config.relay_url,
        "Starting rcs-agent"
    );

    // Consent bridge and its loopback endpoint
    let store = FileStore::open(&config.consent.bridge_dir).await?;
    let bridge = ConsentBridge::new(Arc::new(store));
    // nothing from a previous run may answer a new request
    bridge.clear_all().await?;

    let token =
        consent_api::resolve_token(config.consent.token.as_deref(), &config.consent.bridge_dir)
            .await?;
    let listener = consent_api::bind(config.consent.bind_addr).await?;
    let api_state = ConsentApiState {
        bridge: bridge.clone(),
        token,
    };
    tokio::spawn(async move {
        if let Err(e) = consent_api::serve(listener, api_state).await {
            error!("Consent endpoint error: {}", e);
        }
    });

    // Session runtime
    let executor = platform::input_executor()?;
    let manager = SessionManager::new(
        config.client_id(),
        config.display_name.clone(),
        bridge,
        executor,
        Arc::new(SystemClock),
    );
    let (runtime, handle, status_rx) =
        EndpointRuntime::new(manager, RuntimeLimits::from_config(&config));

    let link = RelayLink::new(
        &config.relay_url,
        config.relay_token.clone(),
        config.client_id(),
        handle,
        status_rx,
    )
    .with_backoff(
        Duration::from_millis(config.reconnect_initial_ms),
        Duration::from_millis(config.reconnect_max_ms),
    )
    .with_backlog(config.status_queue_capacity);
    let link_task = tokio::spawn(link.run());

    runtime
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await;

    link_task.abort();
    info!("rcs-agent stopped");
    Ok(())
}
