//! Presence and fan-out bookkeeping.
//!
//! The registry knows which endpoints currently hold an inbound channel and
//! which supervisors listen for each endpoint's status frames. It never looks
//! inside a frame.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use rcs_proto::v1::{ClientId, ErrorCode, ErrorFrame, RelayFrame};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("endpoint {0} is not connected")]
    EndpointNotConnected(ClientId),
    #[error("frame addressed to {frame} arrived on the channel for {path}")]
    AddressMismatch { path: ClientId, frame: ClientId },
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

impl RelayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RelayError::EndpointNotConnected(_) => ErrorCode::EndpointNotConnected,
            RelayError::AddressMismatch { .. } => ErrorCode::AddressMismatch,
            RelayError::MalformedFrame(_) => ErrorCode::MalformedFrame,
        }
    }

    /// The error frame sent back to whoever sent the offending frame.
    pub fn to_frame(&self) -> RelayFrame {
        let client_id = match self {
            RelayError::EndpointNotConnected(id) => Some(id.clone()),
            RelayError::AddressMismatch { frame, .. } => Some(frame.clone()),
            RelayError::MalformedFrame(_) => None,
        };
        RelayFrame::Error(ErrorFrame {
            code: self.code(),
            message: self.to_string(),
            client_id,
        })
    }
}

/// Read the addressed client id of a raw frame and check it against the
/// channel it arrived on.
pub fn address_of(text: &str, channel: &ClientId) -> Result<ClientId, RelayError> {
    let addressed = RelayFrame::peek_client_id(text)
        .map_err(|e| RelayError::MalformedFrame(e.to_string()))?
        .ok_or_else(|| RelayError::MalformedFrame("missing clientId".to_string()))?;
    if &addressed != channel {
        return Err(RelayError::AddressMismatch {
            path: channel.clone(),
            frame: addressed,
        });
    }
    Ok(addressed)
}

struct EndpointHandle {
    conn_id: u64,
    tx: mpsc::Sender<String>,
}

/// A live endpoint registration. Frames for the endpoint arrive on `rx`.
pub struct EndpointLease {
    pub client_id: ClientId,
    pub conn_id: u64,
    pub rx: mpsc::Receiver<String>,
}

pub struct EndpointRegistry {
    endpoints: DashMap<ClientId, EndpointHandle>,
    listeners: DashMap<ClientId, broadcast::Sender<String>>,
    next_conn: AtomicU64,
    queue_capacity: usize,
    status_capacity: usize,
}

impl EndpointRegistry {
    pub fn new(queue_capacity: usize, status_capacity: usize) -> Self {
        Self {
            endpoints: DashMap::new(),
            listeners: DashMap::new(),
            next_conn: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
            status_capacity: status_capacity.max(1),
        }
    }

    /// Register an endpoint connection. A newer connection for the same id
    /// replaces the older one, whose receiver then closes.
    pub fn register(&self, client_id: ClientId) -> EndpointLease {
        let conn_id = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        if self
            .endpoints
            .insert(client_id.clone(), EndpointHandle { conn_id, tx })
            .is_some()
        {
            info!(client_id = %client_id, conn_id, "endpoint reconnected, replacing channel");
        }
        EndpointLease {
            client_id,
            conn_id,
            rx,
        }
    }

    /// Drop the registration if it still belongs to `conn_id`.
    pub fn unregister(&self, client_id: &ClientId, conn_id: u64) -> bool {
        self.endpoints
            .remove_if(client_id, |_, handle| handle.conn_id == conn_id)
            .is_some()
    }

    pub fn is_connected(&self, client_id: &ClientId) -> bool {
        self.endpoints
            .get(client_id)
            .map(|h| !h.tx.is_closed())
            .unwrap_or(false)
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Hand a frame to the endpoint's inbound channel. Fails immediately if the
    /// endpoint is not connected; nothing is queued for absent endpoints.
    pub async fn forward(&self, client_id: &ClientId, text: String) -> Result<(), RelayError> {
        let tx = self
            .endpoints
            .get(client_id)
            .map(|h| h.tx.clone())
            .ok_or_else(|| RelayError::EndpointNotConnected(client_id.clone()))?;
        tx.send(text)
            .await
            .map_err(|_| RelayError::EndpointNotConnected(client_id.clone()))
    }

    /// Subscribe to every frame the endpoint sends back.
    pub fn subscribe(&self, client_id: &ClientId) -> broadcast::Receiver<String> {
        self.listeners
            .entry(client_id.clone())
            .or_insert_with(|| broadcast::channel(self.status_capacity).0)
            .subscribe()
    }

    /// Fan a frame out to the endpoint's subscribers. Returns how many
    /// subscribers received it.
    pub fn publish(&self, client_id: &ClientId, text: String) -> usize {
        let Some(sender) = self.listeners.get(client_id).map(|s| s.clone()) else {
            debug!(client_id = %client_id, "no supervisors subscribed");
            return 0;
        };
        sender.send(text).unwrap_or(0)
    }
}
