//! The endpoint's WebSocket to the relay.
//!
//! Inbound frames are handed to the runtime queues; outbound statuses are
//! sent as they arrive. While the relay is unreachable statuses wait in a
//! bounded backlog that is flushed, oldest first, on the next connect. The
//! link reconnects with exponential backoff. Session deadlines live in the
//! runtime, so a reconnect never extends or cancels a session.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use rcs_proto::v1::{ClientId, RelayFrame, SessionStatus};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Default number of statuses held while the relay is unreachable.
pub const DEFAULT_BACKLOG: usize = 64;

use crate::runtime::RuntimeHandle;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid relay token header")]
    BadToken,
    #[error("status queue closed")]
    StatusClosed,
}

pub struct RelayLink {
    url: String,
    token: Option<String>,
    client_id: ClientId,
    handle: RuntimeHandle,
    status_rx: mpsc::Receiver<SessionStatus>,
    initial_backoff: Duration,
    max_backoff: Duration,
    backlog: Backlog,
}

impl RelayLink {
    pub fn new(
        relay_url: &str,
        token: Option<String>,
        client_id: ClientId,
        handle: RuntimeHandle,
        status_rx: mpsc::Receiver<SessionStatus>,
    ) -> Self {
        Self {
            url: connect_url(relay_url, &client_id),
            token,
            client_id,
            handle,
            status_rx,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backlog: Backlog::new(DEFAULT_BACKLOG),
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    pub fn with_backlog(mut self, capacity: usize) -> Self {
        self.backlog = Backlog::new(capacity);
        self
    }

    /// Keep a connection up until the runtime drops its status queue.
    pub async fn run(mut self) {
        let mut backoff = self.initial_backoff;
        loop {
            match self.connect_and_pump().await {
                Ok(()) => {
                    info!(client_id = %self.client_id, "relay link closed");
                    backoff = self.initial_backoff;
                }
                Err(LinkError::StatusClosed) => return,
                Err(e) => warn!(client_id = %self.client_id, error = %e, "relay link failed"),
            }

            let sleep = tokio::time::sleep(backoff);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    status = self.status_rx.recv() => match status {
                        Some(s) => {
                            debug!(
                                session = %s.session_id.short(),
                                state = %s.state,
                                "relay offline, holding status"
                            );
                            self.backlog.push(s);
                        }
                        None => return,
                    },
                }
            }
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }

    async fn connect_and_pump(&mut self) -> Result<(), LinkError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| LinkError::BadToken)?;
            request.headers_mut().insert("authorization", value);
        }

        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        info!(client_id = %self.client_id, url = %self.url, "connected to relay");
        let (mut sink, mut stream) = socket.split();

        if !self.backlog.is_empty() {
            info!(client_id = %self.client_id, held = self.backlog.len(), "flushing held statuses");
        }
        while let Some(status) = self.backlog.pop() {
            if let Err(e) = send_status(&mut sink, &status).await {
                self.backlog.requeue(status);
                return Err(e);
            }
        }

        loop {
            tokio::select! {
                inbound = stream.next() => {
                    let msg = match inbound {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    };
                    match msg {
                        Message::Text(_) => {
                            let Ok(text) = msg.to_text() else { continue };
                            self.dispatch(text);
                        }
                        Message::Ping(payload) => sink.send(Message::Pong(payload)).await?,
                        Message::Close(_) => return Ok(()),
                        _ => {}
                    }
                }
                status = self.status_rx.recv() => {
                    let Some(status) = status else {
                        let _ = sink.close().await;
                        return Err(LinkError::StatusClosed);
                    };
                    if let Err(e) = send_status(&mut sink, &status).await {
                        self.backlog.requeue(status);
                        return Err(e);
                    }
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        let frame = match RelayFrame::from_json(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "dropping undecodable frame");
                return;
            }
        };
        if let Err(e) = self.handle.dispatch(frame) {
            warn!(client_id = %self.client_id, error = %e, "dropping frame");
        }
    }
}

async fn send_status<S>(sink: &mut S, status: &SessionStatus) -> Result<(), LinkError>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    match RelayFrame::SessionStatus(status.clone()).to_json() {
        Ok(json) => sink.send(Message::Text(json.into())).await?,
        Err(e) => warn!(error = %e, "failed to encode status"),
    }
    Ok(())
}

/// Statuses waiting for the relay, oldest first.
#[derive(Debug)]
struct Backlog {
    queue: VecDeque<SessionStatus>,
    capacity: usize,
}

impl Backlog {
    fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn push(&mut self, status: SessionStatus) {
        self.queue.push_back(status);
        self.trim();
    }

    /// Put back a status whose send failed.
    fn requeue(&mut self, status: SessionStatus) {
        self.queue.push_front(status);
        self.trim();
    }

    fn pop(&mut self) -> Option<SessionStatus> {
        self.queue.pop_front()
    }

    /// Over capacity, the oldest non-terminal status goes first.
    fn trim(&mut self) {
        while self.queue.len() > self.capacity {
            let victim = self
                .queue
                .iter()
                .position(|s| !s.state.is_terminal())
                .unwrap_or(0);
            if let Some(dropped) = self.queue.remove(victim) {
                warn!(
                    session = %dropped.session_id.short(),
                    state = %dropped.state,
                    "status backlog full, dropping status"
                );
            }
        }
    }
}

/// `<relay>/v1/endpoints/<client_id>/connect`
pub fn connect_url(relay_url: &str, client_id: &ClientId) -> String {
    format!(
        "{}/v1/endpoints/{}/connect",
        relay_url.trim_end_matches('/'),
        client_id
    )
}
