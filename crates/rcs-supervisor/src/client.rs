//! Supervisor connection to the relay's control route for one endpoint.

use futures_util::{SinkExt, StreamExt};
use rcs_proto::v1::{ClientId, ErrorFrame, RelayFrame, SessionStatus};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid relay token header")]
    BadToken,
    #[error("relay connection closed")]
    Closed,
}

/// What the relay sends back to a supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Status(SessionStatus),
    Error(ErrorFrame),
}

pub struct RelayClient {
    outbound: mpsc::Sender<RelayFrame>,
    events: mpsc::Receiver<RelayEvent>,
    pump: JoinHandle<()>,
}

/// `<relay>/v1/endpoints/<client_id>/control`
pub fn control_url(relay_url: &str, client_id: &ClientId) -> String {
    format!(
        "{}/v1/endpoints/{}/control",
        relay_url.trim_end_matches('/'),
        client_id
    )
}

impl RelayClient {
    pub async fn connect(
        relay_url: &str,
        client_id: &ClientId,
        token: Option<&str>,
    ) -> Result<Self, ClientError> {
        let url = control_url(relay_url, client_id);
        let mut request = url.as_str().into_client_request()?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ClientError::BadToken)?;
            request.headers_mut().insert("authorization", value);
        }
        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        debug!(url = %url, "connected to relay");

        let (mut sink, mut stream) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<RelayFrame>(256);
        let (events_tx, events) = mpsc::channel::<RelayEvent>(64);

        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    // queued frames go out before anything else is read
                    biased;
                    frame = outbound_rx.recv() => {
                        let Some(frame) = frame else {
                            let _ = sink.close().await;
                            return;
                        };
                        let json = match frame.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "failed to encode frame");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            warn!(error = %e, "relay send failed");
                            return;
                        }
                    }
                    inbound = stream.next() => {
                        let msg = match inbound {
                            Some(Ok(msg)) => msg,
                            Some(Err(e)) => {
                                warn!(error = %e, "relay connection failed");
                                return;
                            }
                            None => return,
                        };
                        let event = match &msg {
                            Message::Text(_) => match msg.to_text().map(RelayFrame::from_json) {
                                Ok(Ok(RelayFrame::SessionStatus(status))) => RelayEvent::Status(status),
                                Ok(Ok(RelayFrame::Error(error))) => RelayEvent::Error(error),
                                Ok(Ok(other)) => {
                                    debug!(?other, "ignoring unexpected frame");
                                    continue;
                                }
                                _ => {
                                    warn!("dropping undecodable frame from relay");
                                    continue;
                                }
                            },
                            Message::Ping(payload) => {
                                let _ = sink.send(Message::Pong(payload.clone())).await;
                                continue;
                            }
                            Message::Close(_) => return,
                            _ => continue,
                        };
                        // nobody listening any more; keep draining outbound
                        let _ = events_tx.send(event).await;
                    }
                }
            }
        });

        Ok(Self {
            outbound,
            events,
            pump,
        })
    }

    pub async fn send(&self, frame: RelayFrame) -> Result<(), ClientError> {
        self.outbound.send(frame).await.map_err(|_| ClientError::Closed)
    }

    pub async fn send_all(&self, frames: Vec<RelayFrame>) -> Result<(), ClientError> {
        for frame in frames {
            self.send(frame).await?;
        }
        Ok(())
    }

    /// Next status or error frame; `None` once the connection is gone.
    pub async fn next_event(&mut self) -> Option<RelayEvent> {
        self.events.recv().await
    }

    /// Flush queued frames and close the socket.
    pub async fn close(self) {
        let Self { outbound, events, pump } = self;
        drop(outbound);
        drop(events);
        let _ = pump.await;
    }
}
