#![allow(unsafe_code)] // Windows API calls require unsafe.

use rcs_core::{DisplayBounds, DisplayBoundsProvider, InputError};
use tracing::debug;
use windows::core::PCWSTR;
use windows::Win32::Graphics::Gdi::{EnumDisplaySettingsW, DEVMODEW, ENUM_CURRENT_SETTINGS};
use windows::Win32::UI::HiDpi::{
    SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
};

/// Opt the process into per-monitor DPI awareness. Fails harmlessly when a
/// manifest or an earlier call already set it.
pub fn enable_dpi_awareness() {
    if let Err(e) =
        unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) }
    {
        debug!("DPI awareness unchanged: {}", e);
    }
}

/// Primary display bounds from the current display mode.
#[derive(Debug, Default)]
pub struct PrimaryDisplay;

impl PrimaryDisplay {
    pub fn new() -> Self {
        Self
    }
}

impl DisplayBoundsProvider for PrimaryDisplay {
    fn primary_bounds(&self) -> Result<DisplayBounds, InputError> {
        let mut mode = DEVMODEW {
            dmSize: std::mem::size_of::<DEVMODEW>() as u16,
            ..Default::default()
        };
        // a null device name selects the primary display
        let ok = unsafe { EnumDisplaySettingsW(PCWSTR::null(), ENUM_CURRENT_SETTINGS, &mut mode) };
        if !ok.as_bool() {
            return Err(InputError::DisplayUnavailable(format!(
                "EnumDisplaySettingsW failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        if mode.dmPelsWidth == 0 || mode.dmPelsHeight == 0 {
            return Err(InputError::DisplayUnavailable(
                "primary display reports an empty mode".to_string(),
            ));
        }
        // the primary display's top-left corner is the desktop origin
        Ok(DisplayBounds::new(0, 0, mode.dmPelsWidth, mode.dmPelsHeight))
    }
}
