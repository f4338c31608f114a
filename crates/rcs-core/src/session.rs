//! Per-endpoint session state machine.
//!
//! The [`SessionManager`] is the only writer of session state for one
//! endpoint. It is driven by a single owner (the endpoint runtime tick), so
//! the "at most one session" rule is carried by the [`SessionSlot`] type
//! rather than by locking.
//!
//! Transitions:
//! - `RequestStart` replaces whatever is in the slot with a new pending
//!   session and publishes the request to the consent bridge.
//! - A matching approval promotes pending to active; a matching denial ends
//!   the session as `Rejected`. Decisions for any other id are ignored.
//! - `Stop` for the current id ends it as `Ended`.
//! - Deadlines are absolute wall-clock instants checked on every tick.
//! - A failing input call ends the session as `Error`.
//!
//! Every transition returns exactly one [`SessionStatus`] for the supervisor.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rcs_proto::v1::{
    ClientId, ConsentDecision, ConsentRequest, SessionAction, SessionCommand, SessionId,
    SessionState, SessionStatus,
};
use rcs_proto::Validate;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::consent::ConsentBridge;
use crate::errors::ControlError;
use crate::executor::InputExecutor;
use crate::input::SessionInput;

// ============================================================================
// Constants
// ============================================================================

pub use rcs_proto::v1::{MIN_APPROVAL_TIMEOUT_SECS, MIN_SESSION_SECS};

/// Status message for a supervisor-initiated stop.
pub const CLOSED_BY_SUPERVISOR: &str = "closed by supervisor.";

/// The local user's answer as carried over the consent bridge.
pub type ApprovalDecision = ConsentDecision;

// ============================================================================
// Session records
// ============================================================================

/// A start request as received from the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub client_id: ClientId,
    pub session_id: SessionId,
    pub requested_by: String,
    pub approval_timeout_seconds: u32,
    pub max_session_seconds: u32,
    pub issued_at: DateTime<Utc>,
}

impl SessionRequest {
    fn to_consent_request(&self) -> ConsentRequest {
        ConsentRequest {
            session_id: self.session_id.clone(),
            requested_by: self.requested_by.clone(),
            approval_timeout_seconds: self.approval_timeout_seconds,
            max_session_seconds: self.max_session_seconds,
            issued_at: self.issued_at,
        }
    }
}

/// A request waiting for the local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSession {
    pub request: SessionRequest,
    pub approval_deadline: DateTime<Utc>,
}

/// An approved session whose input is being honored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub client_id: ClientId,
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_input_at: Option<DateTime<Utc>>,
}

/// The single session slot of an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionSlot {
    #[default]
    Idle,
    Pending(PendingSession),
    Active(ActiveSession),
}

impl SessionSlot {
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            SessionSlot::Idle => None,
            SessionSlot::Pending(p) => Some(&p.request.session_id),
            SessionSlot::Active(a) => Some(&a.session_id),
        }
    }
}

/// Coarse phase of the slot, for logs and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Pending,
    Active,
}

/// Read-only view of the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session_id: Option<SessionId>,
    /// Approval deadline while pending, expiry while active.
    pub deadline: Option<DateTime<Utc>>,
    pub last_input_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Session manager
// ============================================================================

pub struct SessionManager<X: InputExecutor> {
    client_id: ClientId,
    display_name: String,
    bridge: ConsentBridge,
    executor: X,
    clock: Arc<dyn Clock>,
    slot: SessionSlot,
}

impl<X: InputExecutor> SessionManager<X> {
    pub fn new(
        client_id: ClientId,
        display_name: impl Into<String>,
        bridge: ConsentBridge,
        executor: X,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client_id,
            display_name: display_name.into(),
            bridge,
            executor,
            clock,
            slot: SessionSlot::Idle,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn slot(&self) -> &SessionSlot {
        &self.slot
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        match &self.slot {
            SessionSlot::Idle => SessionSnapshot {
                phase: SessionPhase::Idle,
                session_id: None,
                deadline: None,
                last_input_at: None,
            },
            SessionSlot::Pending(p) => SessionSnapshot {
                phase: SessionPhase::Pending,
                session_id: Some(p.request.session_id.clone()),
                deadline: Some(p.approval_deadline),
                last_input_at: None,
            },
            SessionSlot::Active(a) => SessionSnapshot {
                phase: SessionPhase::Active,
                session_id: Some(a.session_id.clone()),
                deadline: Some(a.expires_at),
                last_input_at: a.last_input_at,
            },
        }
    }

    /// Apply a start or stop command from the supervisor.
    pub async fn handle_session_command(&mut self, cmd: SessionCommand) -> Option<SessionStatus> {
        if cmd.client_id != self.client_id {
            debug!(
                client_id = %self.client_id,
                addressed = %cmd.client_id,
                "session command for another endpoint, ignoring"
            );
            return None;
        }
        if let Err(e) = cmd.validate() {
            warn!(client_id = %self.client_id, error = %e, "invalid session command, ignoring");
            return None;
        }

        match cmd.action {
            SessionAction::RequestStart => Some(self.start_pending(cmd).await),
            SessionAction::Stop => {
                if self.slot.session_id() != Some(&cmd.session_id) {
                    debug!(
                        client_id = %self.client_id,
                        session = %cmd.session_id.short(),
                        "stop for unknown session, ignoring"
                    );
                    return None;
                }
                self.terminate(SessionState::Ended, Some(CLOSED_BY_SUPERVISOR.to_string()))
                    .await
            }
        }
    }

    async fn start_pending(&mut self, cmd: SessionCommand) -> SessionStatus {
        let now = self.clock.now();

        let previous = std::mem::take(&mut self.slot);
        if let Some(old) = previous.session_id() {
            info!(
                client_id = %self.client_id,
                superseded = %old.short(),
                session = %cmd.session_id.short(),
                "new request supersedes current session"
            );
        }
        if let SessionSlot::Active(_) = previous {
            self.release_input();
        }

        let request = SessionRequest {
            client_id: cmd.client_id,
            session_id: cmd.session_id,
            requested_by: cmd.requested_by,
            approval_timeout_seconds: cmd.approval_timeout_seconds,
            max_session_seconds: cmd.max_session_seconds,
            issued_at: now,
        };

        // An old decision must never answer this request.
        if let Err(e) = self.bridge.clear_decision().await {
            warn!(client_id = %self.client_id, error = %e, "failed to clear stale decision");
        }
        if let Err(e) = self.bridge.publish_request(&request.to_consent_request()).await {
            // The approval deadline still bounds the pending session.
            error!(client_id = %self.client_id, error = %e, "failed to publish consent request");
        }

        let window = request.approval_timeout_seconds.max(MIN_APPROVAL_TIMEOUT_SECS);
        let approval_deadline = now + Duration::seconds(i64::from(window));
        let session_id = request.session_id.clone();

        info!(
            client_id = %self.client_id,
            session = %session_id.short(),
            requested_by = %request.requested_by,
            approval_window_secs = window,
            "session pending approval"
        );
        self.slot = SessionSlot::Pending(PendingSession {
            request,
            approval_deadline,
        });
        self.status(session_id, SessionState::PendingApproval, None)
    }

    /// Read the consent bridge once and apply any decision found there.
    pub async fn poll_consent(&mut self) -> Option<SessionStatus> {
        if !matches!(self.slot, SessionSlot::Pending(_)) {
            return None;
        }
        match self.bridge.take_decision().await {
            Ok(Some(decision)) => self.apply_decision(decision).await,
            Ok(None) => None,
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "consent bridge read failed");
                None
            }
        }
    }

    /// Resolve the pending session with the user's decision.
    pub async fn apply_decision(&mut self, decision: ApprovalDecision) -> Option<SessionStatus> {
        let SessionSlot::Pending(pending) = &self.slot else {
            debug!(client_id = %self.client_id, "decision with no pending session, ignoring");
            return None;
        };
        if pending.request.session_id != decision.session_id {
            debug!(
                client_id = %self.client_id,
                pending = %pending.request.session_id.short(),
                decided = %decision.session_id.short(),
                "decision for another session, ignoring"
            );
            return None;
        }

        let now = self.clock.now();
        if now >= pending.approval_deadline {
            return self
                .terminate(SessionState::Expired, Some(ControlError::ConsentTimeout.to_string()))
                .await;
        }

        if !decision.approved {
            let reason = ControlError::UserRejected(decision.message);
            return self.terminate(SessionState::Rejected, Some(reason.to_string())).await;
        }

        let length = pending.request.max_session_seconds.max(MIN_SESSION_SECS);
        let active = ActiveSession {
            client_id: pending.request.client_id.clone(),
            session_id: pending.request.session_id.clone(),
            started_at: now,
            expires_at: now + Duration::seconds(i64::from(length)),
            last_input_at: None,
        };
        if let Err(e) = self.bridge.clear_request().await {
            warn!(client_id = %self.client_id, error = %e, "failed to clear answered request");
        }

        let session_id = active.session_id.clone();
        info!(
            client_id = %self.client_id,
            session = %session_id.short(),
            expires_at = %active.expires_at,
            "session approved"
        );
        self.slot = SessionSlot::Active(active);
        Some(self.status(session_id, SessionState::Approved, decision.message))
    }

    /// Forward one input command if it belongs to the active session.
    ///
    /// Returns a status only when the command ends the session.
    pub async fn handle_input(&mut self, input: SessionInput) -> Option<SessionStatus> {
        if input.client_id != self.client_id {
            return None;
        }
        let now = self.clock.now();
        let SessionSlot::Active(active) = &mut self.slot else {
            debug!(
                client_id = %self.client_id,
                session = %input.session_id.short(),
                "input without an active session, dropping"
            );
            return None;
        };
        if active.session_id != input.session_id {
            debug!(
                client_id = %self.client_id,
                session = %input.session_id.short(),
                "input for inactive session, dropping"
            );
            return None;
        }
        if now >= active.expires_at {
            return self
                .terminate(SessionState::Expired, Some(ControlError::SessionTimeout.to_string()))
                .await;
        }

        match self.executor.execute(&input.command) {
            Ok(()) => {
                active.last_input_at = Some(now);
                None
            }
            Err(e) => {
                let err = ControlError::InputExecution(e.to_string());
                error!(
                    client_id = %self.client_id,
                    session = %input.session_id.short(),
                    kind = ?input.command.kind(),
                    error = %err,
                    "input execution failed, ending session"
                );
                self.terminate(SessionState::Error, Some(err.to_string())).await
            }
        }
    }

    /// Expire the pending or active session if its deadline has passed.
    pub async fn check_deadlines(&mut self) -> Option<SessionStatus> {
        let now = self.clock.now();
        let expired = match &self.slot {
            SessionSlot::Idle => None,
            SessionSlot::Pending(p) if now >= p.approval_deadline => {
                Some(ControlError::ConsentTimeout)
            }
            SessionSlot::Active(a) if now >= a.expires_at => Some(ControlError::SessionTimeout),
            _ => None,
        }?;
        self.terminate(SessionState::Expired, Some(expired.to_string()))
            .await
    }

    /// Move the slot to idle and report the terminal state. Clears all bridge
    /// state and releases held input if the session was active.
    async fn terminate(
        &mut self,
        state: SessionState,
        message: Option<String>,
    ) -> Option<SessionStatus> {
        let ended = std::mem::take(&mut self.slot);
        let session_id = match ended {
            SessionSlot::Idle => return None,
            SessionSlot::Pending(p) => p.request.session_id,
            SessionSlot::Active(a) => {
                self.release_input();
                a.session_id
            }
        };

        if let Err(e) = self.bridge.clear_all().await {
            warn!(client_id = %self.client_id, error = %e, "failed to clear consent bridge");
        }

        info!(
            client_id = %self.client_id,
            session = %session_id.short(),
            state = %state,
            message = message.as_deref().unwrap_or(""),
            "session ended"
        );
        Some(self.status(session_id, state, message))
    }

    fn release_input(&mut self) {
        if let Err(e) = self.executor.release_all() {
            warn!(client_id = %self.client_id, error = %e, "failed to release held input");
        }
    }

    fn status(
        &self,
        session_id: SessionId,
        state: SessionState,
        message: Option<String>,
    ) -> SessionStatus {
        SessionStatus {
            client_id: self.client_id.clone(),
            display_name: self.display_name.clone(),
            session_id,
            state,
            timestamp_utc: self.clock.now(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::harness::{recording_executor, FixedDisplay, Injected, InjectionLog, RecordingInjector};
    use crate::executor::Executor;
    use crate::input::InputCommand;
    use std::time::Duration as StdDuration;

    type TestManager = SessionManager<Executor<RecordingInjector, FixedDisplay>>;

    fn sid(c: char) -> SessionId {
        SessionId::from_wire(c.to_string().repeat(64))
    }

    fn client() -> ClientId {
        ClientId::from("lab-07")
    }

    fn setup() -> (TestManager, Arc<ManualClock>, ConsentBridge, InjectionLog) {
        let clock = Arc::new(ManualClock::starting_now());
        let bridge = ConsentBridge::in_memory();
        let (executor, log) = recording_executor();
        let manager = SessionManager::new(client(), "Lab 07", bridge.clone(), executor, clock.clone());
        (manager, clock, bridge, log)
    }

    fn start(id: &SessionId, timeout: u32, max: u32) -> SessionCommand {
        SessionCommand::request_start(client(), id.clone(), "helpdesk", timeout, max)
    }

    fn mouse_move(id: &SessionId) -> SessionInput {
        SessionInput {
            client_id: client(),
            session_id: id.clone(),
            command: InputCommand::MouseMove { x: 0.5, y: 0.5 },
        }
    }

    async fn approve(manager: &mut TestManager, id: &SessionId) -> SessionStatus {
        manager
            .apply_decision(ConsentDecision {
                session_id: id.clone(),
                approved: true,
                message: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_publishes_to_bridge() {
        let (mut manager, _clock, bridge, _log) = setup();
        let status = manager.handle_session_command(start(&sid('a'), 30, 600)).await.unwrap();
        assert_eq!(status.state, SessionState::PendingApproval);
        assert_eq!(status.display_name, "Lab 07");

        let request = bridge.read_request().await.unwrap().unwrap();
        assert_eq!(request.session_id, sid('a'));
        assert_eq!(request.approval_timeout_seconds, 30);
    }

    #[tokio::test]
    async fn test_approval_floor_is_applied() {
        let (mut manager, clock, _bridge, _log) = setup();
        manager.handle_session_command(start(&sid('a'), 1, 600)).await;
        clock.advance(StdDuration::from_secs(3));
        assert!(manager.check_deadlines().await.is_none());
        clock.advance(StdDuration::from_secs(2));
        let status = manager.check_deadlines().await.unwrap();
        assert_eq!(status.state, SessionState::Expired);
    }

    #[tokio::test]
    async fn test_session_length_floor_is_applied() {
        let (mut manager, clock, _bridge, _log) = setup();
        manager.handle_session_command(start(&sid('a'), 30, 0)).await;
        approve(&mut manager, &sid('a')).await;
        clock.advance(StdDuration::from_secs(14));
        assert!(manager.check_deadlines().await.is_none());
        clock.advance(StdDuration::from_secs(1));
        let status = manager.check_deadlines().await.unwrap();
        assert_eq!(status.state, SessionState::Expired);
        assert_eq!(status.message.as_deref(), Some("session time limit reached"));
    }

    #[tokio::test]
    async fn test_rejection_carries_message_and_clears_bridge() {
        let (mut manager, _clock, bridge, _log) = setup();
        manager.handle_session_command(start(&sid('a'), 30, 600)).await;
        bridge
            .submit_decision(&ConsentDecision {
                session_id: sid('a'),
                approved: false,
                message: Some("not right now".into()),
            })
            .await
            .unwrap();
        let status = manager.poll_consent().await.unwrap();
        assert_eq!(status.state, SessionState::Rejected);
        assert_eq!(status.message.as_deref(), Some("not right now"));
        assert_eq!(manager.snapshot().phase, SessionPhase::Idle);
        assert!(bridge.read_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_late_decision_expires() {
        let (mut manager, clock, bridge, _log) = setup();
        manager.handle_session_command(start(&sid('a'), 10, 600)).await;
        clock.advance(StdDuration::from_secs(11));
        bridge
            .submit_decision(&ConsentDecision {
                session_id: sid('a'),
                approved: true,
                message: None,
            })
            .await
            .unwrap();
        let status = manager.poll_consent().await.unwrap();
        assert_eq!(status.state, SessionState::Expired);
    }

    #[tokio::test]
    async fn test_stale_decision_is_cleared_on_new_request() {
        let (mut manager, _clock, bridge, _log) = setup();
        bridge
            .submit_decision(&ConsentDecision {
                session_id: sid('a'),
                approved: true,
                message: None,
            })
            .await
            .unwrap();
        manager.handle_session_command(start(&sid('a'), 30, 600)).await;
        assert!(manager.poll_consent().await.is_none());
        assert_eq!(manager.snapshot().phase, SessionPhase::Pending);
    }

    #[tokio::test]
    async fn test_supersede_active_releases_input() {
        let (mut manager, _clock, _bridge, log) = setup();
        manager.handle_session_command(start(&sid('a'), 30, 600)).await;
        approve(&mut manager, &sid('a')).await;

        let status = manager.handle_session_command(start(&sid('b'), 30, 600)).await.unwrap();
        assert_eq!(status.session_id, sid('b'));
        assert_eq!(status.state, SessionState::PendingApproval);
        assert_eq!(log.events(), vec![Injected::ReleaseAll]);

        assert!(manager.handle_input(mouse_move(&sid('a'))).await.is_none());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_input_updates_last_input() {
        let (mut manager, clock, _bridge, log) = setup();
        manager.handle_session_command(start(&sid('a'), 30, 600)).await;
        approve(&mut manager, &sid('a')).await;
        clock.advance(StdDuration::from_secs(2));
        assert!(manager.handle_input(mouse_move(&sid('a'))).await.is_none());
        assert_eq!(manager.snapshot().last_input_at, Some(clock.now()));
        assert_eq!(log.events(), vec![Injected::Move(960, 540)]);
    }

    #[tokio::test]
    async fn test_input_past_expiry_ends_session() {
        let (mut manager, clock, _bridge, log) = setup();
        manager.handle_session_command(start(&sid('a'), 30, 20)).await;
        approve(&mut manager, &sid('a')).await;
        clock.advance(StdDuration::from_secs(21));
        let status = manager.handle_input(mouse_move(&sid('a'))).await.unwrap();
        assert_eq!(status.state, SessionState::Expired);
        assert_eq!(log.events(), vec![Injected::ReleaseAll]);
    }

    #[tokio::test]
    async fn test_commands_for_other_endpoint_are_ignored() {
        let (mut manager, _clock, _bridge, _log) = setup();
        let cmd = SessionCommand::request_start(ClientId::from("lab-08"), sid('a'), "x", 30, 60);
        assert!(manager.handle_session_command(cmd).await.is_none());
        assert_eq!(manager.snapshot().phase, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_stop_for_unknown_session_is_ignored() {
        let (mut manager, _clock, _bridge, _log) = setup();
        manager.handle_session_command(start(&sid('a'), 30, 600)).await;
        let stop = SessionCommand::stop(client(), sid('b'));
        assert!(manager.handle_session_command(stop).await.is_none());
        assert_eq!(manager.snapshot().session_id, Some(sid('a')));
    }
}
