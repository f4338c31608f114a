//! rcs-agent: endpoint side of remote control sessions
//!
//! The agent owns the endpoint's session state. It keeps a WebSocket to the
//! relay, runs the session manager on a single-consumer tick, serves the
//! loopback consent endpoint, and injects approved input through the
//! platform backend.

pub mod config;
pub mod consent_api;
pub mod platform;
pub mod relay_link;
pub mod runtime;

pub use config::AgentConfig;
pub use runtime::{EndpointRuntime, RuntimeHandle, RuntimeLimits};
