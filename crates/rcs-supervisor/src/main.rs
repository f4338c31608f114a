use std::time::Duration;

use clap::Parser;
use rcs_proto::v1::ClientId;
use rcs_supervisor::{ControlRequest, ControlSession, RelayClient, RelayEvent};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rcs-supervisor")]
#[command(about = "Request control of an endpoint and follow the session")]
struct Args {
    /// Relay base URL (ws:// or wss://)
    #[arg(long, env = "RCS_RELAY_URL", default_value = "ws://127.0.0.1:8787")]
    relay_url: String,

    /// Relay access token
    #[arg(long, env = "RCS_RELAY_TOKEN")]
    token: Option<String>,

    /// Endpoint to control
    #[arg(long)]
    client_id: String,

    /// Name shown to the endpoint user
    #[arg(long, env = "USER", default_value = "supervisor")]
    requested_by: String,

    /// Seconds the endpoint user has to answer
    #[arg(long, default_value_t = 30)]
    approval_timeout: u32,

    /// Maximum session length in seconds
    #[arg(long, default_value_t = 600)]
    max_session: u32,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(format!("rcs_supervisor={}", args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("rcs_supervisor=info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let client_id = ClientId::new(args.client_id);
    let mut client = RelayClient::connect(&args.relay_url, &client_id, args.token.as_deref()).await?;

    let (mut session, start) = ControlSession::request(&ControlRequest {
        client_id,
        requested_by: args.requested_by,
        approval_timeout_seconds: args.approval_timeout,
        max_session_seconds: args.max_session,
    })?;
    client.send(start).await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = client.next_event() => match event {
                Some(RelayEvent::Status(status)) => {
                    if session.on_status(&status) {
                        info!(
                            state = %status.state,
                            message = status.message.as_deref().unwrap_or(""),
                            "session status"
                        );
                        if session.is_finished() {
                            break;
                        }
                    }
                }
                Some(RelayEvent::Error(e)) => {
                    error!(code = ?e.code, "relay refused the request: {}", e.message);
                    break;
                }
                None => {
                    warn!("relay connection closed");
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("stopping session");
                client.send_all(session.stop()).await?;
                // wait briefly for the endpoint to confirm
                let confirm = async {
                    while let Some(event) = client.next_event().await {
                        if let RelayEvent::Status(status) = event {
                            if session.on_status(&status) && session.is_finished() {
                                return;
                            }
                        }
                    }
                };
                if tokio::time::timeout(Duration::from_secs(5), confirm).await.is_err() {
                    warn!("no confirmation from endpoint");
                }
                break;
            }
        }
    }

    client.close().await;
    Ok(())
}
