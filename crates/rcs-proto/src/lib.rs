//! Wire format for remote control sessions.
//!
//! Every message that crosses the relay is a JSON text frame carrying one
//! [`v1::RelayFrame`]. The consent bridge payloads live here too, since both
//! the session owner and the consent surface read and write them.

pub mod v1;
pub mod validation;

pub use validation::{Validate, ValidationError, ValidationResult};
