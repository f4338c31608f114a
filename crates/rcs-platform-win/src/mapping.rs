//! Conversions between desktop pixels, `SendInput` absolute units, and
//! layout scan results.

use rcs_core::keymap::{vk, KeyStroke, VirtualKey};
use rcs_core::DisplayBounds;

/// Upper end of the `MOUSEEVENTF_ABSOLUTE` range.
pub const ABSOLUTE_MAX: i64 = 65535;

/// Convert a desktop pixel on `bounds` to absolute units. Without
/// `MOUSEEVENTF_VIRTUALDESK` the absolute range spans the primary display.
pub fn to_absolute(x: i32, y: i32, bounds: &DisplayBounds) -> (i32, i32) {
    (
        axis_to_absolute(x, bounds.left, bounds.width),
        axis_to_absolute(y, bounds.top, bounds.height),
    )
}

fn axis_to_absolute(value: i32, origin: i32, extent: u32) -> i32 {
    if extent < 2 {
        return 0;
    }
    let span = i64::from(extent) - 1;
    let offset = (i64::from(value) - i64::from(origin)).clamp(0, span);
    // round to nearest so the OS maps back to the same pixel
    ((offset * ABSOLUTE_MAX + span / 2) / span) as i32
}

/// Keys that need `KEYEVENTF_EXTENDEDKEY` to reach the right scan code.
pub fn is_extended(key: VirtualKey) -> bool {
    matches!(
        key,
        vk::LEFT
            | vk::UP
            | vk::RIGHT
            | vk::DOWN
            | vk::PRIOR
            | vk::NEXT
            | vk::END
            | vk::HOME
            | vk::INSERT
            | vk::DELETE
            | vk::SNAPSHOT
            | vk::DIVIDE
            | vk::NUMLOCK
            | vk::RCONTROL
            | vk::RMENU
            | vk::LWIN
            | vk::RWIN
            | vk::APPS
    )
}

/// Decode a `VkKeyScanW` result. Characters that need Ctrl or Alt on the
/// active layout (AltGr combinations) are not representable as a stroke.
pub fn decode_vk_scan(scan: i16) -> Option<KeyStroke> {
    if scan == -1 {
        return None;
    }
    let bits = scan as u16;
    let key = bits & 0x00FF;
    let state = bits >> 8;
    if state & !0x01 != 0 {
        return None;
    }
    Some(KeyStroke {
        vk: key,
        shift: state & 0x01 != 0,
    })
}
