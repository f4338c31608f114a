#![cfg(target_os = "linux")]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rcs_core::input::MouseButton;
use rcs_core::keymap::VirtualKey;
use rcs_core::{DisplayBounds, InputError, InputInjector};
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{self, ConnectionExt as XprotoConnectionExt, Keycode, Window};
use x11rb::protocol::xtest::ConnectionExt as XTestConnectionExt;
use x11rb::rust_connection::RustConnection;

use crate::keysyms::{self, Keysym};

fn injection_failed<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> InputError {
    move |e| InputError::InjectionFailed(format!("{} failed: {}", what, e))
}

/// XTest-based input injection (X11)
pub struct XTestInjector {
    conn: Arc<RustConnection>,
    root: Window,
    keycodes: HashMap<Keysym, Keycode>,
    held_keys: HashSet<Keycode>,
    held_buttons: HashSet<u8>,
}

impl XTestInjector {
    pub fn new(conn: Arc<RustConnection>, screen_num: usize) -> Result<Self, InputError> {
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|s| s.root)
            .ok_or_else(|| {
                InputError::BackendUnavailable(format!("X screen {} does not exist", screen_num))
            })?;

        conn.xtest_get_version(2, 2)
            .map_err(|e| InputError::BackendUnavailable(format!("XTest unavailable: {}", e)))?
            .reply()
            .map_err(|e| InputError::BackendUnavailable(format!("XTest unavailable: {}", e)))?;

        let keycodes = load_keycodes(&conn)?;
        debug!(mapped = keycodes.len(), "loaded keyboard mapping");
        Ok(Self {
            conn,
            root,
            keycodes,
            held_keys: HashSet::new(),
            held_buttons: HashSet::new(),
        })
    }

    fn fake(&self, kind: u8, detail: u8, x: i16, y: i16) -> Result<(), InputError> {
        self.conn
            .xtest_fake_input(kind, detail, 0, self.root, x, y, 0)
            .map_err(injection_failed("XTest fake input"))?;
        self.conn.flush().map_err(injection_failed("flush"))?;
        Ok(())
    }

    fn press_button(&mut self, button: u8, down: bool) -> Result<(), InputError> {
        let kind = if down {
            xproto::BUTTON_PRESS_EVENT
        } else {
            xproto::BUTTON_RELEASE_EVENT
        };
        self.fake(kind, button, 0, 0)?;
        if down {
            self.held_buttons.insert(button);
        } else {
            self.held_buttons.remove(&button);
        }
        Ok(())
    }

    fn press_keycode(&mut self, keycode: Keycode, down: bool) -> Result<(), InputError> {
        let kind = if down {
            xproto::KEY_PRESS_EVENT
        } else {
            xproto::KEY_RELEASE_EVENT
        };
        self.fake(kind, keycode, 0, 0)?;
        if down {
            self.held_keys.insert(keycode);
        } else {
            self.held_keys.remove(&keycode);
        }
        Ok(())
    }
}

/// Lowest keycode producing each keysym, unshifted column first.
fn load_keycodes(conn: &RustConnection) -> Result<HashMap<Keysym, Keycode>, InputError> {
    let setup = conn.setup();
    let (min, max) = (setup.min_keycode, setup.max_keycode);
    let mapping = conn
        .get_keyboard_mapping(min, max.saturating_sub(min).saturating_add(1))
        .map_err(|e| InputError::BackendUnavailable(format!("GetKeyboardMapping failed: {}", e)))?
        .reply()
        .map_err(|e| InputError::BackendUnavailable(format!("GetKeyboardMapping failed: {}", e)))?;

    let per = usize::from(mapping.keysyms_per_keycode);
    let mut keycodes = HashMap::new();
    if per == 0 {
        return Ok(keycodes);
    }
    for column in 0..per {
        for (i, row) in mapping.keysyms.chunks(per).enumerate() {
            let sym = match row.get(column) {
                Some(&sym) if sym != 0 => sym,
                _ => continue,
            };
            let keycode = min.saturating_add(i as u8);
            keycodes.entry(sym).or_insert(keycode);
        }
    }
    Ok(keycodes)
}

impl InputInjector for XTestInjector {
    fn move_to(&mut self, x: i32, y: i32, _bounds: &DisplayBounds) -> Result<(), InputError> {
        let x = x.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        let y = y.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        // detail 0 selects absolute motion on the root window
        self.fake(xproto::MOTION_NOTIFY_EVENT, 0, x, y)
    }

    fn button(&mut self, button: MouseButton, down: bool) -> Result<(), InputError> {
        let code = match button {
            MouseButton::Left => keysyms::BUTTON_LEFT,
            MouseButton::Middle => keysyms::BUTTON_MIDDLE,
            MouseButton::Right => keysyms::BUTTON_RIGHT,
        };
        self.press_button(code, down)
    }

    fn wheel(&mut self, delta: i32) -> Result<(), InputError> {
        let Some((button, clicks)) = keysyms::wheel_clicks(delta) else {
            return Ok(());
        };
        for _ in 0..clicks {
            self.press_button(button, true)?;
            self.press_button(button, false)?;
        }
        Ok(())
    }

    fn key(&mut self, key: VirtualKey, down: bool) -> Result<(), InputError> {
        let keycode = keysyms::keysym_for(key).and_then(|sym| self.keycodes.get(&sym).copied());
        let Some(keycode) = keycode else {
            // not present in the active keyboard mapping
            warn!(key, "no keycode for virtual key, skipping");
            return Ok(());
        };
        self.press_keycode(keycode, down)
    }

    fn release_all(&mut self) -> Result<(), InputError> {
        let mut result = Ok(());
        for keycode in self.held_keys.clone() {
            if let Err(e) = self.press_keycode(keycode, false) {
                warn!(keycode, "failed to release key: {}", e);
                result = result.and(Err(e));
            }
        }
        for button in self.held_buttons.clone() {
            if let Err(e) = self.press_button(button, false) {
                warn!(button, "failed to release button: {}", e);
                result = result.and(Err(e));
            }
        }
        result
    }
}

impl Drop for XTestInjector {
    fn drop(&mut self) {
        let _ = self.release_all();
    }
}
