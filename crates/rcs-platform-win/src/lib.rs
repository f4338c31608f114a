//! Windows input backend.
//!
//! Pointer input is injected with `SendInput` in absolute coordinates
//! normalized over the primary display. The process opts into per-monitor
//! DPI awareness so the display mode reports physical pixels.

// Pure coordinate and key helpers, testable on any host
pub mod mapping;

#[cfg(windows)]
pub mod display;
#[cfg(windows)]
pub mod injector;

#[cfg(windows)]
pub use display::PrimaryDisplay;
#[cfg(windows)]
pub use injector::SendInputInjector;

/// Build the executor the agent runs input through.
#[cfg(windows)]
pub fn executor(
) -> Result<rcs_core::Executor<SendInputInjector, PrimaryDisplay>, rcs_core::InputError> {
    use rcs_core::DisplayBoundsProvider;

    display::enable_dpi_awareness();
    let display = PrimaryDisplay::new();
    let bounds = display.primary_bounds()?;
    tracing::info!(
        width = bounds.width,
        height = bounds.height,
        "SendInput backend ready on primary display"
    );
    Ok(rcs_core::Executor::new(SendInputInjector::new(), display))
}
