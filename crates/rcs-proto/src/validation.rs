//! Validation helpers for protocol messages.
//!
//! Frames arrive from the network and from a local key-value store; both are
//! checked here before the session owner acts on them.

use crate::v1::*;

/// Validation error types for protocol messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required field is empty
    EmptyField { field: &'static str },
    /// Field is longer than allowed
    TooLong { field: &'static str, max: usize, actual: usize },
    /// Field contains invalid data
    InvalidData { field: &'static str, reason: &'static str },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField { field } => write!(f, "required field '{}' is empty", field),
            Self::TooLong { field, max, actual } => {
                write!(f, "field '{}' is {} bytes long (max {})", field, actual, max)
            }
            Self::InvalidData { field, reason } => {
                write!(f, "field '{}' contains invalid data: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Field limits.
pub mod limits {
    /// Maximum length of a client id.
    pub const MAX_CLIENT_ID_LEN: usize = 128;
    /// Maximum length of the requester label.
    pub const MAX_REQUESTED_BY_LEN: usize = 256;
    /// Maximum length of a key or code label.
    pub const MAX_KEY_LABEL_LEN: usize = 64;
    /// Maximum length of a free-form status or decision message.
    pub const MAX_MESSAGE_LEN: usize = 1024;
}

/// Trait for validating protocol messages.
pub trait Validate {
    /// Validate the message fields.
    fn validate(&self) -> ValidationResult<()>;
}

fn validate_len(field: &'static str, value: &str, max: usize) -> ValidationResult<()> {
    if value.len() > max {
        return Err(ValidationError::TooLong {
            field,
            max,
            actual: value.len(),
        });
    }
    Ok(())
}

fn validate_not_empty(field: &'static str, value: &str) -> ValidationResult<()> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

impl Validate for ClientId {
    fn validate(&self) -> ValidationResult<()> {
        validate_not_empty("client_id", self.as_str())?;
        validate_len("client_id", self.as_str(), limits::MAX_CLIENT_ID_LEN)?;
        if self.as_str().chars().any(|c| c.is_control() || c == '/') {
            return Err(ValidationError::InvalidData {
                field: "client_id",
                reason: "control characters and '/' are not allowed",
            });
        }
        Ok(())
    }
}

impl Validate for SessionId {
    fn validate(&self) -> ValidationResult<()> {
        let id = self.as_str();
        validate_not_empty("session_id", id)?;
        if id.len() != SessionId::BYTES * 2 {
            return Err(ValidationError::InvalidData {
                field: "session_id",
                reason: "expected 64 hex characters",
            });
        }
        if !id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(ValidationError::InvalidData {
                field: "session_id",
                reason: "expected 64 lowercase hex characters",
            });
        }
        Ok(())
    }
}

impl Validate for SessionCommand {
    fn validate(&self) -> ValidationResult<()> {
        self.client_id.validate()?;
        self.session_id.validate()?;
        validate_len("requested_by", &self.requested_by, limits::MAX_REQUESTED_BY_LEN)?;
        Ok(())
    }
}

impl Validate for InputCommand {
    fn validate(&self) -> ValidationResult<()> {
        self.client_id.validate()?;
        self.session_id.validate()?;
        for (field, value) in [("x", self.x), ("y", self.y)] {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(ValidationError::InvalidData {
                        field,
                        reason: "coordinate must be finite",
                    });
                }
            }
        }
        if let Some(key) = &self.key {
            validate_len("key", key, limits::MAX_KEY_LABEL_LEN)?;
        }
        if let Some(code) = &self.code {
            validate_len("code", code, limits::MAX_KEY_LABEL_LEN)?;
        }
        Ok(())
    }
}

impl Validate for ConsentRequest {
    fn validate(&self) -> ValidationResult<()> {
        self.session_id.validate()?;
        validate_len("requested_by", &self.requested_by, limits::MAX_REQUESTED_BY_LEN)
    }
}

impl Validate for ConsentDecision {
    fn validate(&self) -> ValidationResult<()> {
        self.session_id.validate()?;
        if let Some(message) = &self.message {
            validate_len("message", message, limits::MAX_MESSAGE_LEN)?;
        }
        Ok(())
    }
}
