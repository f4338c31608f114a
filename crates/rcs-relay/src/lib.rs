//! rcs-relay: addressed WebSocket relay for remote control sessions
//!
//! Supervisors and endpoints each hold a WebSocket to the relay. Frames from a
//! supervisor are forwarded verbatim to the addressed endpoint, and frames
//! from an endpoint are fanned out to its supervisors. The relay reads only the
//! `clientId` of a frame and keeps no session state.

pub mod config;
pub mod metrics;
pub mod registry;
pub mod server;

pub use config::RelayConfig;
pub use registry::{EndpointRegistry, RelayError};
pub use server::RelayServer;
