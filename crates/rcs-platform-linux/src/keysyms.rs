//! Virtual-key to X keysym translation and wheel button mapping.

use rcs_core::keymap::{vk, VirtualKey};

pub type Keysym = u32;

/// X core button numbers.
pub const BUTTON_LEFT: u8 = 1;
pub const BUTTON_MIDDLE: u8 = 2;
pub const BUTTON_RIGHT: u8 = 3;
pub const BUTTON_WHEEL_UP: u8 = 4;
pub const BUTTON_WHEEL_DOWN: u8 = 5;

const NOTCH: i32 = 120;

/// Keysym for a virtual key. Letters map to their lowercase keysym, which is
/// what column 0 of a keyboard mapping holds.
pub fn keysym_for(key: VirtualKey) -> Option<Keysym> {
    if (vk::KEY_A..vk::KEY_A + 26).contains(&key) {
        return Some(0x61 + Keysym::from(key - vk::KEY_A));
    }
    if (vk::KEY_0..vk::KEY_0 + 10).contains(&key) {
        return Some(0x30 + Keysym::from(key - vk::KEY_0));
    }
    if (vk::NUMPAD0..vk::NUMPAD0 + 10).contains(&key) {
        return Some(0xFFB0 + Keysym::from(key - vk::NUMPAD0));
    }
    if (vk::F1..vk::F1 + 24).contains(&key) {
        return Some(0xFFBE + Keysym::from(key - vk::F1));
    }
    let sym = match key {
        vk::BACK => 0xFF08,
        vk::TAB => 0xFF09,
        vk::RETURN => 0xFF0D,
        vk::PAUSE => 0xFF13,
        vk::SCROLL => 0xFF14,
        vk::ESCAPE => 0xFF1B,
        vk::HOME => 0xFF50,
        vk::LEFT => 0xFF51,
        vk::UP => 0xFF52,
        vk::RIGHT => 0xFF53,
        vk::DOWN => 0xFF54,
        vk::PRIOR => 0xFF55,
        vk::NEXT => 0xFF56,
        vk::END => 0xFF57,
        vk::SNAPSHOT => 0xFF61,
        vk::INSERT => 0xFF63,
        vk::APPS => 0xFF67,
        vk::NUMLOCK => 0xFF7F,
        vk::MULTIPLY => 0xFFAA,
        vk::ADD => 0xFFAB,
        vk::SUBTRACT => 0xFFAD,
        vk::DECIMAL => 0xFFAE,
        vk::DIVIDE => 0xFFAF,
        vk::SHIFT | vk::LSHIFT => 0xFFE1,
        vk::RSHIFT => 0xFFE2,
        vk::CONTROL | vk::LCONTROL => 0xFFE3,
        vk::RCONTROL => 0xFFE4,
        vk::CAPITAL => 0xFFE5,
        vk::MENU | vk::LMENU => 0xFFE9,
        vk::RMENU => 0xFFEA,
        vk::LWIN => 0xFFEB,
        vk::RWIN => 0xFFEC,
        vk::DELETE => 0xFFFF,
        vk::SPACE => 0x20,
        vk::OEM_7 => 0x27,
        vk::OEM_COMMA => 0x2C,
        vk::OEM_MINUS => 0x2D,
        vk::OEM_PERIOD => 0x2E,
        vk::OEM_2 => 0x2F,
        vk::OEM_1 => 0x3B,
        vk::OEM_102 => 0x3C,
        vk::OEM_PLUS => 0x3D,
        vk::OEM_4 => 0x5B,
        vk::OEM_5 => 0x5C,
        vk::OEM_6 => 0x5D,
        vk::OEM_3 => 0x60,
        _ => return None,
    };
    Some(sym)
}

/// Wheel button and click count for a 120-unit delta. Deltas smaller than a
/// notch still produce one click.
pub fn wheel_clicks(delta: i32) -> Option<(u8, u32)> {
    if delta == 0 {
        return None;
    }
    let button = if delta > 0 {
        BUTTON_WHEEL_UP
    } else {
        BUTTON_WHEEL_DOWN
    };
    let magnitude = delta.unsigned_abs();
    let clicks = ((magnitude + NOTCH as u32 / 2) / NOTCH as u32).max(1);
    Some((button, clicks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_letters_and_digits() {
        assert_eq!(keysym_for(vk::KEY_A), Some(0x61));
        assert_eq!(keysym_for(vk::KEY_A + 25), Some(0x7A));
        assert_eq!(keysym_for(vk::KEY_0 + 7), Some(0x37));
    }

    #[test]
    fn test_navigation_and_modifiers() {
        assert_eq!(keysym_for(vk::LEFT), Some(0xFF51));
        assert_eq!(keysym_for(vk::CONTROL), keysym_for(vk::LCONTROL));
        assert_eq!(keysym_for(vk::F1 + 11), Some(0xFFC9));
        assert_eq!(keysym_for(vk::DELETE), Some(0xFFFF));
    }

    #[test]
    fn test_unknown_key() {
        assert_eq!(keysym_for(0xFF), None);
    }

    #[test]
    fn test_wheel_clicks() {
        assert_eq!(wheel_clicks(0), None);
        assert_eq!(wheel_clicks(120), Some((BUTTON_WHEEL_UP, 1)));
        assert_eq!(wheel_clicks(-360), Some((BUTTON_WHEEL_DOWN, 3)));
        assert_eq!(wheel_clicks(15), Some((BUTTON_WHEEL_UP, 1)));
        assert_eq!(wheel_clicks(1200), Some((BUTTON_WHEEL_UP, 10)));
    }

    proptest! {
        #[test]
        fn prop_wheel_direction_follows_sign(delta in any::<i32>()) {
            match wheel_clicks(delta) {
                None => prop_assert_eq!(delta, 0),
                Some((button, clicks)) => {
                    prop_assert!(clicks >= 1);
                    let expected = if delta > 0 { BUTTON_WHEEL_UP } else { BUTTON_WHEEL_DOWN };
                    prop_assert_eq!(button, expected);
                }
            }
        }
    }
}
