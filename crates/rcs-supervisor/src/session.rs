//! Supervisor-side view of one control session.

use std::time::Instant;

use rcs_core::input::MouseButton;
use rcs_core::{InputCommand, KeyPress};
use rcs_proto::v1::{ClientId, RelayFrame, SessionCommand, SessionId, SessionState, SessionStatus};
use tracing::{debug, info};

use crate::mapper::{InputMapper, Point};

/// Parameters of a control request.
#[derive(Debug, Clone)]
pub struct ControlRequest {
    pub client_id: ClientId,
    pub requested_by: String,
    pub approval_timeout_seconds: u32,
    pub max_session_seconds: u32,
}

pub struct ControlSession {
    client_id: ClientId,
    session_id: SessionId,
    state: Option<SessionState>,
    last_message: Option<String>,
    mapper: InputMapper,
}

impl ControlSession {
    /// Mint a session id and build the `RequestStart` frame for it.
    pub fn request(request: &ControlRequest) -> Result<(Self, RelayFrame), getrandom::Error> {
        let session_id = SessionId::generate()?;
        let frame = RelayFrame::SessionCommand(SessionCommand::request_start(
            request.client_id.clone(),
            session_id.clone(),
            request.requested_by.clone(),
            request.approval_timeout_seconds,
            request.max_session_seconds,
        ));
        info!(
            client_id = %request.client_id,
            session = %session_id.short(),
            "requesting control"
        );
        let session = Self {
            client_id: request.client_id.clone(),
            session_id,
            state: None,
            last_message: None,
            mapper: InputMapper::new(),
        };
        Ok((session, frame))
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Latest state reported by the endpoint, `None` before the first status.
    pub fn state(&self) -> Option<SessionState> {
        self.state
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.state == Some(SessionState::Approved)
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_some_and(SessionState::is_terminal)
    }

    pub fn mapper(&self) -> &InputMapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut InputMapper {
        &mut self.mapper
    }

    /// Apply a status for this session. Statuses for other sessions return
    /// `false` and change nothing.
    pub fn on_status(&mut self, status: &SessionStatus) -> bool {
        if status.client_id != self.client_id || status.session_id != self.session_id {
            return false;
        }
        debug!(session = %self.session_id.short(), state = %status.state, "status");
        self.state = Some(status.state);
        self.last_message = status.message.clone();
        if status.state.is_terminal() {
            // the endpoint already released everything
            self.mapper.clear();
        }
        true
    }

    fn frame(&self, command: InputCommand) -> RelayFrame {
        RelayFrame::InputCommand(command.to_wire(self.client_id.clone(), self.session_id.clone()))
    }

    /// Input is only sent while the session is approved.
    fn input(&self, command: Option<InputCommand>) -> Option<RelayFrame> {
        if !self.is_active() {
            return None;
        }
        command.map(|c| self.frame(c))
    }

    pub fn pointer_moved(&mut self, pos: Point, now: Instant) -> Option<RelayFrame> {
        if !self.is_active() {
            return None;
        }
        let command = self.mapper.pointer_moved(pos, now);
        self.input(command)
    }

    pub fn button(&mut self, pos: Point, button: MouseButton, down: bool) -> Option<RelayFrame> {
        if !self.is_active() {
            return None;
        }
        let command = self.mapper.button(pos, button, down);
        self.input(command)
    }

    pub fn wheel(&mut self, pos: Point, delta: i32) -> Option<RelayFrame> {
        if !self.is_active() {
            return None;
        }
        let command = self.mapper.wheel(pos, delta);
        self.input(command)
    }

    pub fn key(&mut self, press: KeyPress, down: bool) -> Option<RelayFrame> {
        if !self.is_active() {
            return None;
        }
        let command = self.mapper.key(press, down);
        self.input(command)
    }

    /// Frames that end the session: a `KeyUp` for every key still held, then
    /// `Stop`. Also used when the viewport closes.
    pub fn stop(&mut self) -> Vec<RelayFrame> {
        let mut frames: Vec<RelayFrame> = if self.is_active() {
            self.mapper
                .release_all()
                .into_iter()
                .map(|c| self.frame(c))
                .collect()
        } else {
            self.mapper.clear();
            Vec::new()
        };
        frames.push(RelayFrame::SessionCommand(SessionCommand::stop(
            self.client_id.clone(),
            self.session_id.clone(),
        )));
        info!(
            client_id = %self.client_id,
            session = %self.session_id.short(),
            released = frames.len() - 1,
            "stopping control"
        );
        frames
    }
}
