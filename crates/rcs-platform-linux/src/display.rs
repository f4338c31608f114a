#![cfg(target_os = "linux")]

use std::sync::Arc;

use rcs_core::{DisplayBounds, DisplayBoundsProvider, InputError};
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::randr::{self, ConnectionExt as RandrConnectionExt};
use x11rb::protocol::xproto::Window;
use x11rb::rust_connection::RustConnection;

fn query_failed<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> InputError {
    move |e| InputError::DisplayUnavailable(format!("{} failed: {}", what, e))
}

/// Primary output bounds via RandR, re-queried on every call.
pub struct PrimaryOutput {
    conn: Arc<RustConnection>,
    root: Window,
    screen_width: u16,
    screen_height: u16,
}

impl PrimaryOutput {
    pub fn new(conn: Arc<RustConnection>, screen_num: usize) -> Result<Self, InputError> {
        let screen = conn.setup().roots.get(screen_num).ok_or_else(|| {
            InputError::DisplayUnavailable(format!("X screen {} does not exist", screen_num))
        })?;
        let (root, screen_width, screen_height) =
            (screen.root, screen.width_in_pixels, screen.height_in_pixels);

        conn.randr_query_version(1, 5)
            .map_err(query_failed("RandR query"))?
            .reply()
            .map_err(query_failed("RandR query"))?;

        Ok(Self {
            conn,
            root,
            screen_width,
            screen_height,
        })
    }

    /// Bounds of `output` if it is connected and driving a CRTC.
    fn output_bounds(
        &self,
        output: randr::Output,
        timestamp: u32,
    ) -> Result<Option<DisplayBounds>, InputError> {
        let info = self
            .conn
            .randr_get_output_info(output, timestamp)
            .map_err(query_failed("GetOutputInfo"))?
            .reply()
            .map_err(query_failed("GetOutputInfo"))?;
        if info.connection != randr::Connection::CONNECTED || info.crtc == 0 {
            return Ok(None);
        }
        let crtc = self
            .conn
            .randr_get_crtc_info(info.crtc, timestamp)
            .map_err(query_failed("GetCrtcInfo"))?
            .reply()
            .map_err(query_failed("GetCrtcInfo"))?;
        if crtc.width == 0 || crtc.height == 0 {
            return Ok(None);
        }
        Ok(Some(DisplayBounds::new(
            i32::from(crtc.x),
            i32::from(crtc.y),
            u32::from(crtc.width),
            u32::from(crtc.height),
        )))
    }
}

impl DisplayBoundsProvider for PrimaryOutput {
    fn primary_bounds(&self) -> Result<DisplayBounds, InputError> {
        let resources = self
            .conn
            .randr_get_screen_resources_current(self.root)
            .map_err(query_failed("GetScreenResourcesCurrent"))?
            .reply()
            .map_err(query_failed("GetScreenResourcesCurrent"))?;
        let primary = self
            .conn
            .randr_get_output_primary(self.root)
            .map_err(query_failed("GetOutputPrimary"))?
            .reply()
            .map_err(query_failed("GetOutputPrimary"))?
            .output;

        if primary != 0 {
            if let Some(bounds) = self.output_bounds(primary, resources.config_timestamp)? {
                return Ok(bounds);
            }
        }
        for &output in &resources.outputs {
            if let Some(bounds) = self.output_bounds(output, resources.config_timestamp)? {
                debug!(output, "no primary output set, using first connected output");
                return Ok(bounds);
            }
        }

        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(InputError::DisplayUnavailable(
                "no connected output and an empty screen".to_string(),
            ));
        }
        Ok(DisplayBounds::new(
            0,
            0,
            u32::from(self.screen_width),
            u32::from(self.screen_height),
        ))
    }
}
