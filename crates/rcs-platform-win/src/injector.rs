#![allow(unsafe_code)] // Windows API calls require unsafe.

use std::collections::HashSet;

use rcs_core::input::MouseButton;
use rcs_core::keymap::{KeyStroke, VirtualKey};
use rcs_core::{DisplayBounds, InputError, InputInjector};
use tracing::warn;
use windows::Win32::UI::Input::KeyboardAndMouse::*;

use crate::mapping;

/// Windows input injection via SendInput
#[derive(Debug, Default)]
pub struct SendInputInjector {
    held_keys: HashSet<VirtualKey>,
    held_buttons: HashSet<MouseButton>,
}

impl SendInputInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held_keys(&self) -> &HashSet<VirtualKey> {
        &self.held_keys
    }
}

fn send(inputs: &[INPUT]) -> Result<(), InputError> {
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize == inputs.len() {
        Ok(())
    } else {
        // blocked by UIPI when the foreground window belongs to a higher
        // integrity process
        Err(InputError::InjectionFailed(format!(
            "SendInput accepted {} of {} events: {}",
            sent,
            inputs.len(),
            std::io::Error::last_os_error()
        )))
    }
}

fn mouse_input(dx: i32, dy: i32, data: u32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy,
                mouseData: data,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn key_input(key: VirtualKey, down: bool) -> INPUT {
    let mut flags = if down {
        KEYBD_EVENT_FLAGS(0)
    } else {
        KEYEVENTF_KEYUP
    };
    if mapping::is_extended(key) {
        flags = flags | KEYEVENTF_EXTENDEDKEY;
    }
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(key),
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

impl InputInjector for SendInputInjector {
    fn move_to(&mut self, x: i32, y: i32, bounds: &DisplayBounds) -> Result<(), InputError> {
        let (ax, ay) = mapping::to_absolute(x, y, bounds);
        send(&[mouse_input(
            ax,
            ay,
            0,
            MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE,
        )])
    }

    fn button(&mut self, button: MouseButton, down: bool) -> Result<(), InputError> {
        let flag = match (button, down) {
            (MouseButton::Left, true) => MOUSEEVENTF_LEFTDOWN,
            (MouseButton::Left, false) => MOUSEEVENTF_LEFTUP,
            (MouseButton::Right, true) => MOUSEEVENTF_RIGHTDOWN,
            (MouseButton::Right, false) => MOUSEEVENTF_RIGHTUP,
            (MouseButton::Middle, true) => MOUSEEVENTF_MIDDLEDOWN,
            (MouseButton::Middle, false) => MOUSEEVENTF_MIDDLEUP,
        };
        send(&[mouse_input(0, 0, 0, flag)])?;
        if down {
            self.held_buttons.insert(button);
        } else {
            self.held_buttons.remove(&button);
        }
        Ok(())
    }

    fn wheel(&mut self, delta: i32) -> Result<(), InputError> {
        if delta == 0 {
            return Ok(());
        }
        // mouseData carries the signed delta reinterpreted as unsigned
        send(&[mouse_input(0, 0, delta as u32, MOUSEEVENTF_WHEEL)])
    }

    fn key(&mut self, key: VirtualKey, down: bool) -> Result<(), InputError> {
        send(&[key_input(key, down)])?;
        if down {
            self.held_keys.insert(key);
        } else {
            self.held_keys.remove(&key);
        }
        Ok(())
    }

    fn translate_char(&self, ch: char) -> Option<KeyStroke> {
        let mut units = [0u16; 2];
        let encoded = ch.encode_utf16(&mut units);
        if encoded.len() != 1 {
            return None;
        }
        mapping::decode_vk_scan(unsafe { VkKeyScanW(encoded[0]) })
    }

    fn release_all(&mut self) -> Result<(), InputError> {
        let mut result = Ok(());
        for key in self.held_keys.clone() {
            if let Err(e) = self.key(key, false) {
                warn!(key, "failed to release key: {}", e);
                result = result.and(Err(e));
            }
        }
        for button in self.held_buttons.clone() {
            if let Err(e) = self.button(button, false) {
                warn!(?button, "failed to release button: {}", e);
                result = result.and(Err(e));
            }
        }
        result
    }
}

impl Drop for SendInputInjector {
    fn drop(&mut self) {
        let _ = self.release_all();
    }
}
