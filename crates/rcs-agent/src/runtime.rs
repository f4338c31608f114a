//! Single-consumer session runtime for one endpoint.
//!
//! Session and input commands arrive on separate bounded queues, each item
//! stamped with a shared arrival sequence. One task owns the
//! [`SessionManager`] and processes both on a fixed tick:
//!
//! 1. every queued session command, each preceded by the input that arrived
//!    before it
//! 2. one consent bridge read
//! 3. up to `input_budget` further input commands, in arrival order
//! 4. the deadline check
//!
//! Input is applied in arrival order relative to session commands, and a
//! session command waits at most one tick.
//!
//! Statuses produced along the way go to the outbound queue drained by the
//! relay link.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rcs_core::{InputExecutor, SessionInput, SessionManager};
use rcs_proto::v1::{RelayFrame, SessionCommand, SessionStatus};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{0} queue is full")]
    QueueFull(&'static str),
    #[error("session runtime has stopped")]
    Closed,
    #[error("undecodable input command: {0}")]
    BadInput(String),
}

/// Tunables for [`EndpointRuntime`].
#[derive(Debug, Clone, Copy)]
pub struct RuntimeLimits {
    pub tick_interval: Duration,
    pub input_budget: usize,
    pub session_queue: usize,
    pub input_queue: usize,
    pub status_queue: usize,
}

impl RuntimeLimits {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            input_budget: config.input_budget_per_tick,
            session_queue: config.session_queue_capacity,
            input_queue: config.input_queue_capacity,
            status_queue: config.status_queue_capacity,
        }
    }
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            input_budget: 64,
            session_queue: 32,
            input_queue: 256,
            status_queue: 64,
        }
    }
}

/// A queued item and its position in overall arrival order.
#[derive(Debug)]
struct Sequenced<T> {
    seq: u64,
    item: T,
}

/// Producer side of the runtime queues. Cheap to clone.
#[derive(Clone)]
pub struct RuntimeHandle {
    session_tx: mpsc::Sender<Sequenced<SessionCommand>>,
    input_tx: mpsc::Sender<Sequenced<SessionInput>>,
    next_seq: Arc<AtomicU64>,
}

impl RuntimeHandle {
    pub fn submit_session(&self, cmd: SessionCommand) -> Result<(), DispatchError> {
        let item = Sequenced {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            item: cmd,
        };
        self.session_tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::QueueFull("session"),
            TrySendError::Closed(_) => DispatchError::Closed,
        })
    }

    pub fn submit_input(&self, input: SessionInput) -> Result<(), DispatchError> {
        let item = Sequenced {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            item: input,
        };
        self.input_tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::QueueFull("input"),
            TrySendError::Closed(_) => DispatchError::Closed,
        })
    }

    /// Route one frame from the relay to the matching queue. Frames the
    /// endpoint does not consume are ignored.
    pub fn dispatch(&self, frame: RelayFrame) -> Result<(), DispatchError> {
        match frame {
            RelayFrame::SessionCommand(cmd) => self.submit_session(cmd),
            RelayFrame::InputCommand(wire) => {
                let input = SessionInput::try_from(wire)
                    .map_err(|e| DispatchError::BadInput(e.to_string()))?;
                self.submit_input(input)
            }
            RelayFrame::Error(e) => {
                warn!(code = ?e.code, "relay reported an error: {}", e.message);
                Ok(())
            }
            RelayFrame::SessionStatus(_) => {
                debug!("ignoring status frame on endpoint channel");
                Ok(())
            }
        }
    }
}

pub struct EndpointRuntime<X: InputExecutor> {
    manager: SessionManager<X>,
    session_rx: mpsc::Receiver<Sequenced<SessionCommand>>,
    input_rx: mpsc::Receiver<Sequenced<SessionInput>>,
    /// Input taken off the queue but not yet due.
    held_input: Option<Sequenced<SessionInput>>,
    status_tx: mpsc::Sender<SessionStatus>,
    limits: RuntimeLimits,
}

impl<X: InputExecutor> EndpointRuntime<X> {
    /// Build the runtime, its producer handle, and the outbound status queue.
    pub fn new(
        manager: SessionManager<X>,
        limits: RuntimeLimits,
    ) -> (Self, RuntimeHandle, mpsc::Receiver<SessionStatus>) {
        let (session_tx, session_rx) = mpsc::channel(limits.session_queue.max(1));
        let (input_tx, input_rx) = mpsc::channel(limits.input_queue.max(1));
        let (status_tx, status_rx) = mpsc::channel(limits.status_queue.max(1));
        let runtime = Self {
            manager,
            session_rx,
            input_rx,
            held_input: None,
            status_tx,
            limits,
        };
        let handle = RuntimeHandle {
            session_tx,
            input_tx,
            next_seq: Arc::new(AtomicU64::new(0)),
        };
        (runtime, handle, status_rx)
    }

    pub fn manager(&self) -> &SessionManager<X> {
        &self.manager
    }

    /// Run one processing tick.
    pub async fn tick_once(&mut self) {
        while let Ok(cmd) = self.session_rx.try_recv() {
            while let Some(input) = self.next_input(Some(cmd.seq)) {
                let status = self.manager.handle_input(input).await;
                self.emit(status);
            }
            let status = self.manager.handle_session_command(cmd.item).await;
            self.emit(status);
        }

        let status = self.manager.poll_consent().await;
        self.emit(status);

        for _ in 0..self.limits.input_budget.max(1) {
            let Some(input) = self.next_input(None) else {
                break;
            };
            let status = self.manager.handle_input(input).await;
            self.emit(status);
        }

        let status = self.manager.check_deadlines().await;
        self.emit(status);
    }

    /// Next queued input, if it arrived before `before`.
    fn next_input(&mut self, before: Option<u64>) -> Option<SessionInput> {
        let next = match self.held_input.take() {
            Some(held) => held,
            None => self.input_rx.try_recv().ok()?,
        };
        match before {
            Some(limit) if next.seq >= limit => {
                self.held_input = Some(next);
                None
            }
            _ => Some(next.item),
        }
    }

    /// Tick until `shutdown` resolves.
    pub async fn run<F: Future<Output = ()>>(mut self, shutdown: F) {
        let mut interval = tokio::time::interval(self.limits.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            client_id = %self.manager.client_id(),
            tick_ms = self.limits.tick_interval.as_millis() as u64,
            "session runtime started"
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => self.tick_once().await,
            }
        }
        info!(client_id = %self.manager.client_id(), "session runtime stopped");
    }

    fn emit(&self, status: Option<SessionStatus>) {
        let Some(status) = status else { return };
        match self.status_tx.try_send(status) {
            Ok(()) => {}
            Err(TrySendError::Full(s)) => warn!(
                session = %s.session_id.short(),
                state = %s.state,
                "status queue full, dropping status"
            ),
            Err(TrySendError::Closed(_)) => debug!("status queue closed"),
        }
    }
}
