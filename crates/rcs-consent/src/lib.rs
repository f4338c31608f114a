//! RCS Consent - the interactive half of the consent handshake.
//!
//! Runs in the logged-in user's session. It polls the agent's loopback
//! endpoint for a pending control request, shows the user a time-bound
//! prompt, and posts the answer back. If the user does not answer before
//! the approval window closes, the surface denies on its own.

pub mod client;
pub mod prompt;
pub mod surface;

pub use client::{BridgeClient, BridgeClientError, ConsentEndpoint};
pub use prompt::{PromptAnswer, Prompter, TerminalPrompter};
pub use surface::{ConsentSurface, DENIED_BY_USER, NO_RESPONSE};
