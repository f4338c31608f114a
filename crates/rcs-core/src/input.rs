//! Typed input commands.
//!
//! The wire form is flat with optional fields; inside the endpoint every
//! command is one of six tagged variants and the executor matches on the tag.

use rcs_proto::v1::{self, ClientId, InputKind, SessionId};
use rcs_proto::{Validate, ValidationError};
use thiserror::Error;

pub use rcs_proto::v1::MouseButton;

/// Keyboard payload shared by `KeyDown` and `KeyUp`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPress {
    /// Logical key label, e.g. `"a"` or `"Enter"`.
    pub key: Option<String>,
    /// Layout-independent physical code, e.g. `"KeyA"`.
    pub code: Option<String>,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

/// One normalized input command. `x`/`y` are fractions of the remote frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InputCommand {
    MouseMove { x: f64, y: f64 },
    MouseDown { x: f64, y: f64, button: MouseButton },
    MouseUp { x: f64, y: f64, button: MouseButton },
    MouseWheel { x: f64, y: f64, delta: i32 },
    KeyDown(KeyPress),
    KeyUp(KeyPress),
}

impl InputCommand {
    pub fn kind(&self) -> InputKind {
        match self {
            InputCommand::MouseMove { .. } => InputKind::MouseMove,
            InputCommand::MouseDown { .. } => InputKind::MouseDown,
            InputCommand::MouseUp { .. } => InputKind::MouseUp,
            InputCommand::MouseWheel { .. } => InputKind::MouseWheel,
            InputCommand::KeyDown(_) => InputKind::KeyDown,
            InputCommand::KeyUp(_) => InputKind::KeyUp,
        }
    }

    /// Flatten into the wire form addressed to `client_id` under `session_id`.
    pub fn to_wire(&self, client_id: ClientId, session_id: SessionId) -> v1::InputCommand {
        let mut wire = v1::InputCommand::new(client_id, session_id, self.kind());
        match self {
            InputCommand::MouseMove { x, y } => {
                wire.x = Some(*x);
                wire.y = Some(*y);
            }
            InputCommand::MouseDown { x, y, button } | InputCommand::MouseUp { x, y, button } => {
                wire.x = Some(*x);
                wire.y = Some(*y);
                wire.button = Some(*button);
            }
            InputCommand::MouseWheel { x, y, delta } => {
                wire.x = Some(*x);
                wire.y = Some(*y);
                wire.wheel_delta = Some(*delta);
            }
            InputCommand::KeyDown(press) | InputCommand::KeyUp(press) => {
                wire.key = press.key.clone();
                wire.code = press.code.clone();
                wire.ctrl = Some(press.ctrl);
                wire.alt = Some(press.alt);
                wire.shift = Some(press.shift);
            }
        }
        wire
    }
}

/// An input command together with the session it claims to belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInput {
    pub client_id: ClientId,
    pub session_id: SessionId,
    pub command: InputCommand,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputDecodeError {
    #[error("{kind:?} command is missing '{field}'")]
    MissingField { kind: InputKind, field: &'static str },
    #[error("key command carries neither 'key' nor 'code'")]
    NoKey,
    #[error("invalid input command: {0}")]
    Invalid(#[from] ValidationError),
}

fn required<T>(value: Option<T>, kind: InputKind, field: &'static str) -> Result<T, InputDecodeError> {
    value.ok_or(InputDecodeError::MissingField { kind, field })
}

impl TryFrom<v1::InputCommand> for SessionInput {
    type Error = InputDecodeError;

    fn try_from(wire: v1::InputCommand) -> Result<Self, Self::Error> {
        wire.validate()?;
        let kind = wire.kind;
        let command = match kind {
            InputKind::MouseMove => InputCommand::MouseMove {
                x: required(wire.x, kind, "x")?,
                y: required(wire.y, kind, "y")?,
            },
            InputKind::MouseDown => InputCommand::MouseDown {
                x: required(wire.x, kind, "x")?,
                y: required(wire.y, kind, "y")?,
                button: required(wire.button, kind, "button")?,
            },
            InputKind::MouseUp => InputCommand::MouseUp {
                x: required(wire.x, kind, "x")?,
                y: required(wire.y, kind, "y")?,
                button: required(wire.button, kind, "button")?,
            },
            InputKind::MouseWheel => InputCommand::MouseWheel {
                x: required(wire.x, kind, "x")?,
                y: required(wire.y, kind, "y")?,
                delta: required(wire.wheel_delta, kind, "wheelDelta")?,
            },
            InputKind::KeyDown | InputKind::KeyUp => {
                if wire.key.as_deref().map_or(true, str::is_empty)
                    && wire.code.as_deref().map_or(true, str::is_empty)
                {
                    return Err(InputDecodeError::NoKey);
                }
                let press = KeyPress {
                    key: wire.key.filter(|k| !k.is_empty()),
                    code: wire.code.filter(|c| !c.is_empty()),
                    ctrl: wire.ctrl.unwrap_or(false),
                    alt: wire.alt.unwrap_or(false),
                    shift: wire.shift.unwrap_or(false),
                };
                if kind == InputKind::KeyDown {
                    InputCommand::KeyDown(press)
                } else {
                    InputCommand::KeyUp(press)
                }
            }
        };
        Ok(SessionInput {
            client_id: wire.client_id,
            session_id: wire.session_id,
            command,
        })
    }
}
