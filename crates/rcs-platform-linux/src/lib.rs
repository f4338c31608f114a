//! Linux (X11) input backend.
//!
//! Pointer events go through XTest in root-window coordinates. The primary
//! display is the RandR primary output; when none is set the first connected
//! output is used, then the whole screen.

// Pure tables, testable without an X server
pub mod keysyms;

#[cfg(target_os = "linux")]
pub mod display;
#[cfg(target_os = "linux")]
pub mod injector;

#[cfg(target_os = "linux")]
pub use display::PrimaryOutput;
#[cfg(target_os = "linux")]
pub use injector::XTestInjector;

/// Build the executor the agent runs input through.
#[cfg(target_os = "linux")]
pub fn executor(
) -> Result<rcs_core::Executor<XTestInjector, PrimaryOutput>, rcs_core::InputError> {
    use std::sync::Arc;

    use rcs_core::{DisplayBoundsProvider, InputError};

    let (conn, screen) = x11rb::connect(None)
        .map_err(|e| InputError::BackendUnavailable(format!("X11 connection failed: {}", e)))?;
    let conn = Arc::new(conn);
    let display = PrimaryOutput::new(conn.clone(), screen)?;
    let bounds = display.primary_bounds()?;
    let injector = XTestInjector::new(conn, screen)?;
    tracing::info!(
        left = bounds.left,
        top = bounds.top,
        width = bounds.width,
        height = bounds.height,
        "XTest backend ready on primary output"
    );
    Ok(rcs_core::Executor::new(injector, display))
}
