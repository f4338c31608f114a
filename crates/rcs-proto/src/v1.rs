//! Version 1 messages.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a monitored endpoint, as known to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unguessable session token, minted by the supervisor at request time.
///
/// Rendered as 64 lowercase hex characters (32 random bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Number of random bytes behind a session id.
    pub const BYTES: usize = 32;

    /// Mint a fresh session id from the OS random source.
    pub fn generate() -> Result<Self, getrandom::Error> {
        let mut bytes = [0u8; Self::BYTES];
        getrandom::getrandom(&mut bytes)?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Wrap an id received off the wire. Use [`crate::Validate`] before trusting it.
    pub fn from_wire(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        self.0.get(..end).unwrap_or(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Session commands and status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionAction {
    RequestStart,
    Stop,
}

/// Supervisor to endpoint: start or stop a control session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCommand {
    pub client_id: ClientId,
    pub session_id: SessionId,
    pub action: SessionAction,
    #[serde(default)]
    pub requested_by: String,
    #[serde(default)]
    pub approval_timeout_seconds: u32,
    #[serde(default)]
    pub max_session_seconds: u32,
}

impl SessionCommand {
    pub fn request_start(
        client_id: ClientId,
        session_id: SessionId,
        requested_by: impl Into<String>,
        approval_timeout_seconds: u32,
        max_session_seconds: u32,
    ) -> Self {
        Self {
            client_id,
            session_id,
            action: SessionAction::RequestStart,
            requested_by: requested_by.into(),
            approval_timeout_seconds,
            max_session_seconds,
        }
    }

    pub fn stop(client_id: ClientId, session_id: SessionId) -> Self {
        Self {
            client_id,
            session_id,
            action: SessionAction::Stop,
            requested_by: String::new(),
            approval_timeout_seconds: 0,
            max_session_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    PendingApproval,
    Approved,
    Rejected,
    Expired,
    Ended,
    Error,
}

impl SessionState {
    /// Whether no further transitions follow for this session id.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Rejected | SessionState::Expired | SessionState::Ended | SessionState::Error
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::PendingApproval => "pending_approval",
            SessionState::Approved => "approved",
            SessionState::Rejected => "rejected",
            SessionState::Expired => "expired",
            SessionState::Ended => "ended",
            SessionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Endpoint to supervisor: one event per session state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub client_id: ClientId,
    pub display_name: String,
    pub session_id: SessionId,
    pub state: SessionState,
    pub timestamp_utc: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Input commands
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputKind {
    MouseMove,
    MouseDown,
    MouseUp,
    MouseWheel,
    KeyDown,
    KeyUp,
}

/// Supervisor to endpoint: one input event, flat on the wire.
///
/// `x`/`y` are fractions of the remote frame. Which optional fields are
/// required depends on `kind`; the session owner rejects incomplete frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputCommand {
    pub client_id: ClientId,
    pub session_id: SessionId,
    pub kind: InputKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<MouseButton>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wheel_delta: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctrl: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift: Option<bool>,
}

impl InputCommand {
    /// Empty command of the given kind; callers fill in the relevant fields.
    pub fn new(client_id: ClientId, session_id: SessionId, kind: InputKind) -> Self {
        Self {
            client_id,
            session_id,
            kind,
            x: None,
            y: None,
            button: None,
            wheel_delta: None,
            key: None,
            code: None,
            ctrl: None,
            alt: None,
            shift: None,
        }
    }
}

// ============================================================================
// Consent bridge payloads
// ============================================================================

/// Floor applied to a requested approval window, by the session owner and
/// the consent surface alike.
pub const MIN_APPROVAL_TIMEOUT_SECS: u32 = 5;

/// Floor applied to a requested session length.
pub const MIN_SESSION_SECS: u32 = 15;

/// Pending request as persisted under the bridge request key and served to
/// the consent surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    pub session_id: SessionId,
    pub requested_by: String,
    pub approval_timeout_seconds: u32,
    pub max_session_seconds: u32,
    pub issued_at: DateTime<Utc>,
}

impl ConsentRequest {
    /// The approval window the session owner actually enforces.
    pub fn approval_window_secs(&self) -> u32 {
        self.approval_timeout_seconds.max(MIN_APPROVAL_TIMEOUT_SECS)
    }
}

/// The local user's answer, persisted under the bridge decision key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentDecision {
    pub session_id: SessionId,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Relay envelope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    EndpointNotConnected,
    AddressMismatch,
    MalformedFrame,
    Unauthorized,
}

/// Relay-generated rejection sent back to the originator of a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrame {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
}

/// Everything that travels over a relay WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RelayFrame {
    SessionCommand(SessionCommand),
    InputCommand(InputCommand),
    SessionStatus(SessionStatus),
    Error(ErrorFrame),
}

/// The only part of a frame the relay looks at.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameAddress {
    #[serde(default)]
    client_id: Option<ClientId>,
}

impl RelayFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Read the addressed client id without interpreting the rest of the frame.
    pub fn peek_client_id(text: &str) -> Result<Option<ClientId>, serde_json::Error> {
        serde_json::from_str::<FrameAddress>(text).map(|a| a.client_id)
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        match self {
            RelayFrame::SessionCommand(c) => Some(&c.client_id),
            RelayFrame::InputCommand(c) => Some(&c.client_id),
            RelayFrame::SessionStatus(s) => Some(&s.client_id),
            RelayFrame::Error(e) => e.client_id.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_generate_is_hex_and_unique() {
        let a = SessionId::generate().unwrap();
        let b = SessionId::generate().unwrap();
        assert_eq!(a.as_str().len(), SessionId::BYTES * 2);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn test_session_command_wire_shape() {
        let cmd = SessionCommand::request_start(
            ClientId::from("lab-07"),
            SessionId::from_wire("ab".repeat(32)),
            "ms.rivera",
            30,
            600,
        );
        let json = RelayFrame::SessionCommand(cmd).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "sessionCommand");
        assert_eq!(value["clientId"], "lab-07");
        assert_eq!(value["action"], "requestStart");
        assert_eq!(value["approvalTimeoutSeconds"], 30);
        assert_eq!(value["maxSessionSeconds"], 600);
    }

    #[test]
    fn test_approval_window_has_a_floor() {
        let mut request = ConsentRequest {
            session_id: SessionId::from_wire("ab".repeat(32)),
            requested_by: "ms.rivera".into(),
            approval_timeout_seconds: 0,
            max_session_seconds: 600,
            issued_at: Utc::now(),
        };
        assert_eq!(request.approval_window_secs(), MIN_APPROVAL_TIMEOUT_SECS);
        request.approval_timeout_seconds = 45;
        assert_eq!(request.approval_window_secs(), 45);
    }

    #[test]
    fn test_stop_command_accepts_missing_optional_fields() {
        let json = format!(
            r#"{{"type":"sessionCommand","clientId":"lab-07","sessionId":"{}","action":"stop"}}"#,
            "cd".repeat(32)
        );
        match RelayFrame::from_json(&json).unwrap() {
            RelayFrame::SessionCommand(cmd) => {
                assert_eq!(cmd.action, SessionAction::Stop);
                assert_eq!(cmd.approval_timeout_seconds, 0);
                assert!(cmd.requested_by.is_empty());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_input_command_omits_absent_fields() {
        let mut cmd = InputCommand::new(
            ClientId::from("lab-07"),
            SessionId::from_wire("ef".repeat(32)),
            InputKind::MouseMove,
        );
        cmd.x = Some(0.25);
        cmd.y = Some(0.75);
        let json = RelayFrame::InputCommand(cmd).to_json().unwrap();
        assert!(json.contains(r#""kind":"mouseMove""#));
        assert!(!json.contains("button"));
        assert!(!json.contains("wheelDelta"));
    }

    #[test]
    fn test_peek_client_id_ignores_payload() {
        let text = r#"{"type":"inputCommand","clientId":"lab-09","whatever":[1,2,3]}"#;
        assert_eq!(
            RelayFrame::peek_client_id(text).unwrap(),
            Some(ClientId::from("lab-09"))
        );
        assert_eq!(RelayFrame::peek_client_id(r#"{"type":"x"}"#).unwrap(), None);
        assert!(RelayFrame::peek_client_id("not json").is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::PendingApproval.is_terminal());
        assert!(!SessionState::Approved.is_terminal());
        assert!(SessionState::Rejected.is_terminal());
        assert!(SessionState::Expired.is_terminal());
        assert!(SessionState::Ended.is_terminal());
        assert!(SessionState::Error.is_terminal());
    }
}
