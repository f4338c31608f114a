//! RCS Supervisor - the operator side of a control session.
//!
//! [`mapper::InputMapper`] turns local pointer and key events into normalized
//! commands against the rendered remote frame. [`session::ControlSession`]
//! addresses them to one session and produces the request and stop frames.
//! [`client::RelayClient`] carries frames to the relay and statuses back.

pub mod client;
pub mod mapper;
pub mod session;

pub use client::{ClientError, RelayClient, RelayEvent};
pub use mapper::{fit_rect, FrameSize, InputMapper, Point, Rect, MOVE_INTERVAL};
pub use session::{ControlRequest, ControlSession};
