//! Error taxonomy for control sessions.
//!
//! Every failure is local to one session. Variants that end a session map to
//! the terminal [`SessionState`] reported to the supervisor; the rest are
//! dropped and logged where they occur.

use rcs_proto::v1::SessionState;
use thiserror::Error;

/// Failures a control session can run into, from addressing through input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// Unknown endpoint or session. Dropped, logged, not retried.
    #[error("addressing error: {0}")]
    Addressing(String),

    /// No decision arrived before the approval deadline.
    #[error("approval window elapsed without a decision")]
    ConsentTimeout,

    /// The local user denied the request.
    #[error("{}", .0.as_deref().unwrap_or("denied by user"))]
    UserRejected(Option<String>),

    /// The approved session reached its time limit.
    #[error("session time limit reached")]
    SessionTimeout,

    /// The platform refused an input call; physical input state is unknown.
    #[error("input execution failed: {0}")]
    InputExecution(String),

    /// A persisted bridge entry could not be decoded. Treated as absent.
    #[error("malformed bridge payload under '{key}': {reason}")]
    BridgeDecode { key: String, reason: String },
}

impl ControlError {
    /// The state a session ends in when this error occurs, if it ends one.
    pub fn terminal_state(&self) -> Option<SessionState> {
        match self {
            ControlError::ConsentTimeout | ControlError::SessionTimeout => {
                Some(SessionState::Expired)
            }
            ControlError::UserRejected(_) => Some(SessionState::Rejected),
            ControlError::InputExecution(_) => Some(SessionState::Error),
            ControlError::Addressing(_) | ControlError::BridgeDecode { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_state_mapping() {
        assert_eq!(ControlError::ConsentTimeout.terminal_state(), Some(SessionState::Expired));
        assert_eq!(ControlError::SessionTimeout.terminal_state(), Some(SessionState::Expired));
        assert_eq!(
            ControlError::UserRejected(None).terminal_state(),
            Some(SessionState::Rejected)
        );
        assert_eq!(
            ControlError::InputExecution("x".into()).terminal_state(),
            Some(SessionState::Error)
        );
        assert_eq!(ControlError::Addressing("x".into()).terminal_state(), None);
    }

    #[test]
    fn test_rejection_message() {
        assert_eq!(ControlError::UserRejected(None).to_string(), "denied by user");
        assert_eq!(
            ControlError::UserRejected(Some("not now".into())).to_string(),
            "not now"
        );
    }
}
