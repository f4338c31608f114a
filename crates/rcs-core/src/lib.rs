//! RCS Core - session authority and input path for remote control.
//!
//! This crate implements:
//! - The per-endpoint session state machine (request, consent, expiry, stop)
//! - The two-key consent bridge shared with the interactive consent surface
//! - The input executor: coordinate mapping, key resolution, modifier wrapping
//! - The error taxonomy shared by the agent, relay, and supervisor

#![deny(unsafe_code)]

// Core state machine
pub mod session;

// Services
pub mod consent;
pub mod executor;

// Supporting modules
pub mod clock;
pub mod errors;
pub mod input;
pub mod keymap;

// Test doubles for injectors and displays
pub mod harness;

pub use clock::{Clock, ManualClock, SystemClock};
pub use consent::{BridgeError, ConsentBridge, FileStore, InMemoryStore, KeyValueStore};
pub use errors::ControlError;
pub use executor::{DisplayBounds, DisplayBoundsProvider, Executor, InputError, InputExecutor, InputInjector};
pub use input::{InputCommand, KeyPress, SessionInput};
pub use session::{SessionManager, SessionPhase, SessionSlot, SessionSnapshot};
