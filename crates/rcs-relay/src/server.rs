//! WebSocket relay server

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, Router},
};
use futures_util::{SinkExt, StreamExt};
use rcs_proto::v1::ClientId;
use rcs_proto::Validate;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::metrics::RelayMetrics;
use crate::registry::{address_of, EndpointRegistry, RelayError};

#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<EndpointRegistry>,
    pub metrics: Arc<RelayMetrics>,
    pub access_token: Option<String>,
}

/// WebSocket relay server
pub struct RelayServer {
    config: RelayConfig,
    state: RelayState,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let registry = Arc::new(EndpointRegistry::new(
            config.endpoint_queue_capacity,
            config.status_channel_capacity,
        ));
        let metrics = Arc::new(RelayMetrics::new()?);
        let state = RelayState {
            registry,
            metrics,
            access_token: config.access_token.clone(),
        };
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/v1/endpoints/:client_id/connect", get(endpoint_handler))
            .route("/v1/endpoints/:client_id/control", get(supervisor_handler))
            .with_state(self.state.clone())
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!("Relay listening on {}", listener.local_addr()?);
        if self.state.access_token.is_none() {
            warn!("No access token configured, relay routes are unauthenticated");
        }
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }

    /// Run the relay server until Ctrl+C
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
    }
}

/// Check bearer authentication, if a token is configured
fn check_auth(headers: &HeaderMap, expected_token: Option<&str>) -> bool {
    let Some(expected) = expected_token else {
        return true;
    };
    let token = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .unwrap_or("");

    !token.is_empty() && token == expected
}

fn admit(state: &RelayState, headers: &HeaderMap, raw_id: String) -> Result<ClientId, Response> {
    if !check_auth(headers, state.access_token.as_deref()) {
        warn!("Relay authentication failed");
        state.metrics.record_auth_failure();
        return Err(StatusCode::UNAUTHORIZED.into_response());
    }
    let client_id = ClientId::new(raw_id);
    if let Err(e) = client_id.validate() {
        debug!("Rejecting invalid client id: {}", e);
        return Err((StatusCode::BAD_REQUEST, e.to_string()).into_response());
    }
    Ok(client_id)
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

async fn metrics_handler(State(state): State<RelayState>) -> Response {
    state
        .metrics
        .set_connected_endpoints(state.registry.endpoint_count());
    match state.metrics.export() {
        Ok(text) => text.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn endpoint_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<RelayState>,
    headers: HeaderMap,
) -> Response {
    match admit(&state, &headers, client_id) {
        Ok(client_id) => ws.on_upgrade(move |socket| endpoint_socket(socket, client_id, state)),
        Err(rejection) => rejection,
    }
}

async fn supervisor_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<RelayState>,
    headers: HeaderMap,
) -> Response {
    match admit(&state, &headers, client_id) {
        Ok(client_id) => ws.on_upgrade(move |socket| supervisor_socket(socket, client_id, state)),
        Err(rejection) => rejection,
    }
}

/// Endpoint channel: frames from supervisors go down, the endpoint's own
/// frames are fanned out to the supervisors of that client id.
async fn endpoint_socket(socket: WebSocket, client_id: ClientId, state: RelayState) {
    let mut lease = state.registry.register(client_id.clone());
    state
        .metrics
        .set_connected_endpoints(state.registry.endpoint_count());
    info!(client_id = %client_id, conn_id = lease.conn_id, "endpoint connected");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outbound = lease.rx.recv() => {
                let Some(text) = outbound else {
                    debug!(client_id = %client_id, "endpoint channel replaced");
                    break;
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => match address_of(&text, &client_id) {
                        Ok(_) => {
                            state.registry.publish(&client_id, text);
                            state.metrics.record_broadcast();
                        }
                        Err(e) => {
                            warn!(client_id = %client_id, error = %e, "dropping endpoint frame");
                            state.metrics.record_malformed();
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(client_id = %client_id, "endpoint socket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    state.registry.unregister(&client_id, lease.conn_id);
    state
        .metrics
        .set_connected_endpoints(state.registry.endpoint_count());
    info!(client_id = %client_id, conn_id = lease.conn_id, "endpoint disconnected");
}

/// Supervisor channel: frames go to the endpoint if it is connected, error
/// frames come straight back otherwise.
async fn supervisor_socket(socket: WebSocket, client_id: ClientId, state: RelayState) {
    let mut statuses = state.registry.subscribe(&client_id);
    state.metrics.supervisor_connected();
    info!(client_id = %client_id, "supervisor attached");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            status = statuses.recv() => {
                match status {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(client_id = %client_id, skipped, "supervisor lagging, skipped statuses");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            inbound = stream.next() => {
                let text = match inbound {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(client_id = %client_id, "supervisor socket error: {}", e);
                        break;
                    }
                };
                let result = match address_of(&text, &client_id) {
                    Ok(target) => state.registry.forward(&target, text).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => state.metrics.record_forward(),
                    Err(e) => {
                        match e {
                            RelayError::MalformedFrame(_) => state.metrics.record_malformed(),
                            _ => state.metrics.record_addressing_error(),
                        }
                        warn!(client_id = %client_id, error = %e, "rejecting supervisor frame");
                        let Ok(reply) = e.to_frame().to_json() else { continue };
                        if sink.send(Message::Text(reply)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    state.metrics.supervisor_disconnected();
    info!(client_id = %client_id, "supervisor detached");
}
