//! Key resolution into the normalized virtual-key space.
//!
//! The normalized space is the Windows virtual-key code set. Resolution
//! prefers the layout-independent physical `code` (`"KeyA"`, `"Digit1"`),
//! then the logical `key` label (`"Enter"`, `"ArrowLeft"`), then a
//! single-character translation supplied by the platform.

/// A key in the normalized virtual-key space.
pub type VirtualKey = u16;

/// Virtual-key constants used outside the letter/digit ranges.
pub mod vk {
    use super::VirtualKey;

    pub const BACK: VirtualKey = 0x08;
    pub const TAB: VirtualKey = 0x09;
    pub const RETURN: VirtualKey = 0x0D;
    pub const SHIFT: VirtualKey = 0x10;
    pub const CONTROL: VirtualKey = 0x11;
    pub const MENU: VirtualKey = 0x12;
    pub const PAUSE: VirtualKey = 0x13;
    pub const CAPITAL: VirtualKey = 0x14;
    pub const ESCAPE: VirtualKey = 0x1B;
    pub const SPACE: VirtualKey = 0x20;
    pub const PRIOR: VirtualKey = 0x21;
    pub const NEXT: VirtualKey = 0x22;
    pub const END: VirtualKey = 0x23;
    pub const HOME: VirtualKey = 0x24;
    pub const LEFT: VirtualKey = 0x25;
    pub const UP: VirtualKey = 0x26;
    pub const RIGHT: VirtualKey = 0x27;
    pub const DOWN: VirtualKey = 0x28;
    pub const SNAPSHOT: VirtualKey = 0x2C;
    pub const INSERT: VirtualKey = 0x2D;
    pub const DELETE: VirtualKey = 0x2E;
    pub const KEY_0: VirtualKey = 0x30;
    pub const KEY_A: VirtualKey = 0x41;
    pub const LWIN: VirtualKey = 0x5B;
    pub const RWIN: VirtualKey = 0x5C;
    pub const APPS: VirtualKey = 0x5D;
    pub const NUMPAD0: VirtualKey = 0x60;
    pub const MULTIPLY: VirtualKey = 0x6A;
    pub const ADD: VirtualKey = 0x6B;
    pub const SUBTRACT: VirtualKey = 0x6D;
    pub const DECIMAL: VirtualKey = 0x6E;
    pub const DIVIDE: VirtualKey = 0x6F;
    pub const F1: VirtualKey = 0x70;
    pub const NUMLOCK: VirtualKey = 0x90;
    pub const SCROLL: VirtualKey = 0x91;
    pub const LSHIFT: VirtualKey = 0xA0;
    pub const RSHIFT: VirtualKey = 0xA1;
    pub const LCONTROL: VirtualKey = 0xA2;
    pub const RCONTROL: VirtualKey = 0xA3;
    pub const LMENU: VirtualKey = 0xA4;
    pub const RMENU: VirtualKey = 0xA5;
    pub const OEM_1: VirtualKey = 0xBA; // ;:
    pub const OEM_PLUS: VirtualKey = 0xBB; // =+
    pub const OEM_COMMA: VirtualKey = 0xBC; // ,<
    pub const OEM_MINUS: VirtualKey = 0xBD; // -_
    pub const OEM_PERIOD: VirtualKey = 0xBE; // .>
    pub const OEM_2: VirtualKey = 0xBF; // /?
    pub const OEM_3: VirtualKey = 0xC0; // `~
    pub const OEM_4: VirtualKey = 0xDB; // [{
    pub const OEM_5: VirtualKey = 0xDC; // \|
    pub const OEM_6: VirtualKey = 0xDD; // ]}
    pub const OEM_7: VirtualKey = 0xDE; // '"
    pub const OEM_102: VirtualKey = 0xE2;
}

/// A resolved key plus whether Shift is needed to produce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub vk: VirtualKey,
    pub shift: bool,
}

impl KeyStroke {
    pub fn plain(vk: VirtualKey) -> Self {
        Self { vk, shift: false }
    }

    pub fn shifted(vk: VirtualKey) -> Self {
        Self { vk, shift: true }
    }
}

/// Modifier families the executor wraps around a primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
}

impl Modifier {
    pub fn vk(self) -> VirtualKey {
        match self {
            Modifier::Ctrl => vk::CONTROL,
            Modifier::Alt => vk::MENU,
            Modifier::Shift => vk::SHIFT,
        }
    }
}

/// The modifier family a key belongs to, if it is a modifier itself.
pub fn modifier_family(key: VirtualKey) -> Option<Modifier> {
    match key {
        vk::CONTROL | vk::LCONTROL | vk::RCONTROL => Some(Modifier::Ctrl),
        vk::MENU | vk::LMENU | vk::RMENU => Some(Modifier::Alt),
        vk::SHIFT | vk::LSHIFT | vk::RSHIFT => Some(Modifier::Shift),
        _ => None,
    }
}

/// Resolve a physical key code (`KeyboardEvent.code` naming).
pub fn vk_from_code(code: &str) -> Option<VirtualKey> {
    if let Some(letter) = code.strip_prefix("Key") {
        return single_ascii(letter)
            .filter(|c| c.is_ascii_uppercase())
            .map(|c| vk::KEY_A + (c as u8 - b'A') as u16);
    }
    if let Some(digit) = code.strip_prefix("Digit") {
        return single_ascii(digit)
            .filter(|c| c.is_ascii_digit())
            .map(|c| vk::KEY_0 + (c as u8 - b'0') as u16);
    }
    if let Some(rest) = code.strip_prefix("Numpad") {
        if let Some(d) = single_ascii(rest).filter(|c| c.is_ascii_digit()) {
            return Some(vk::NUMPAD0 + (d as u8 - b'0') as u16);
        }
        return match rest {
            "Multiply" => Some(vk::MULTIPLY),
            "Add" => Some(vk::ADD),
            "Subtract" => Some(vk::SUBTRACT),
            "Decimal" => Some(vk::DECIMAL),
            "Divide" => Some(vk::DIVIDE),
            "Enter" => Some(vk::RETURN),
            _ => None,
        };
    }
    if let Some(f) = function_key(code) {
        return Some(f);
    }
    match code {
        "ShiftLeft" => Some(vk::LSHIFT),
        "ShiftRight" => Some(vk::RSHIFT),
        "ControlLeft" => Some(vk::LCONTROL),
        "ControlRight" => Some(vk::RCONTROL),
        "AltLeft" => Some(vk::LMENU),
        "AltRight" => Some(vk::RMENU),
        "MetaLeft" | "OSLeft" => Some(vk::LWIN),
        "MetaRight" | "OSRight" => Some(vk::RWIN),
        "Minus" => Some(vk::OEM_MINUS),
        "Equal" => Some(vk::OEM_PLUS),
        "BracketLeft" => Some(vk::OEM_4),
        "BracketRight" => Some(vk::OEM_6),
        "Backslash" => Some(vk::OEM_5),
        "Semicolon" => Some(vk::OEM_1),
        "Quote" => Some(vk::OEM_7),
        "Backquote" => Some(vk::OEM_3),
        "Comma" => Some(vk::OEM_COMMA),
        "Period" => Some(vk::OEM_PERIOD),
        "Slash" => Some(vk::OEM_2),
        "IntlBackslash" => Some(vk::OEM_102),
        "NumLock" => Some(vk::NUMLOCK),
        "ScrollLock" => Some(vk::SCROLL),
        _ => named_key(code),
    }
}

/// Resolve a logical key label (`KeyboardEvent.key` naming) that names a
/// non-character key.
pub fn vk_from_key_label(key: &str) -> Option<VirtualKey> {
    if let Some(f) = function_key(key) {
        return Some(f);
    }
    match key {
        "Shift" => Some(vk::SHIFT),
        "Control" => Some(vk::CONTROL),
        "Alt" | "AltGraph" => Some(vk::MENU),
        "Meta" | "OS" | "Win" => Some(vk::LWIN),
        " " | "Spacebar" => Some(vk::SPACE),
        "Esc" => Some(vk::ESCAPE),
        "Left" => Some(vk::LEFT),
        "Right" => Some(vk::RIGHT),
        "Up" => Some(vk::UP),
        "Down" => Some(vk::DOWN),
        "Del" => Some(vk::DELETE),
        "Apps" => Some(vk::APPS),
        _ => named_key(key),
    }
}

/// US-layout translation of a printable ASCII character.
pub fn ascii_to_key(ch: char) -> Option<KeyStroke> {
    if !ch.is_ascii() {
        return None;
    }
    if ch.is_ascii_lowercase() {
        return Some(KeyStroke::plain(vk::KEY_A + (ch as u8 - b'a') as u16));
    }
    if ch.is_ascii_uppercase() {
        return Some(KeyStroke::shifted(vk::KEY_A + (ch as u8 - b'A') as u16));
    }
    if ch.is_ascii_digit() {
        return Some(KeyStroke::plain(vk::KEY_0 + (ch as u8 - b'0') as u16));
    }
    let stroke = match ch {
        ' ' => KeyStroke::plain(vk::SPACE),
        '\n' | '\r' => KeyStroke::plain(vk::RETURN),
        '\t' => KeyStroke::plain(vk::TAB),
        '-' => KeyStroke::plain(vk::OEM_MINUS),
        '_' => KeyStroke::shifted(vk::OEM_MINUS),
        '=' => KeyStroke::plain(vk::OEM_PLUS),
        '+' => KeyStroke::shifted(vk::OEM_PLUS),
        '[' => KeyStroke::plain(vk::OEM_4),
        '{' => KeyStroke::shifted(vk::OEM_4),
        ']' => KeyStroke::plain(vk::OEM_6),
        '}' => KeyStroke::shifted(vk::OEM_6),
        '\\' => KeyStroke::plain(vk::OEM_5),
        '|' => KeyStroke::shifted(vk::OEM_5),
        ';' => KeyStroke::plain(vk::OEM_1),
        ':' => KeyStroke::shifted(vk::OEM_1),
        '\'' => KeyStroke::plain(vk::OEM_7),
        '"' => KeyStroke::shifted(vk::OEM_7),
        '`' => KeyStroke::plain(vk::OEM_3),
        '~' => KeyStroke::shifted(vk::OEM_3),
        ',' => KeyStroke::plain(vk::OEM_COMMA),
        '<' => KeyStroke::shifted(vk::OEM_COMMA),
        '.' => KeyStroke::plain(vk::OEM_PERIOD),
        '>' => KeyStroke::shifted(vk::OEM_PERIOD),
        '/' => KeyStroke::plain(vk::OEM_2),
        '?' => KeyStroke::shifted(vk::OEM_2),
        '!' => KeyStroke::shifted(vk::KEY_0 + 1),
        '@' => KeyStroke::shifted(vk::KEY_0 + 2),
        '#' => KeyStroke::shifted(vk::KEY_0 + 3),
        '$' => KeyStroke::shifted(vk::KEY_0 + 4),
        '%' => KeyStroke::shifted(vk::KEY_0 + 5),
        '^' => KeyStroke::shifted(vk::KEY_0 + 6),
        '&' => KeyStroke::shifted(vk::KEY_0 + 7),
        '*' => KeyStroke::shifted(vk::KEY_0 + 8),
        '(' => KeyStroke::shifted(vk::KEY_0 + 9),
        ')' => KeyStroke::shifted(vk::KEY_0),
        _ => return None,
    };
    Some(stroke)
}

/// The sole character of a label, if it has exactly one.
pub fn single_char(label: &str) -> Option<char> {
    let mut chars = label.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn single_ascii(s: &str) -> Option<char> {
    single_char(s).filter(|c| c.is_ascii())
}

fn function_key(name: &str) -> Option<VirtualKey> {
    let n: u16 = name.strip_prefix('F')?.parse().ok()?;
    (1..=24).contains(&n).then(|| vk::F1 + n - 1)
}

/// Names shared by `code` and `key`.
fn named_key(name: &str) -> Option<VirtualKey> {
    match name {
        "Enter" => Some(vk::RETURN),
        "Escape" => Some(vk::ESCAPE),
        "Backspace" => Some(vk::BACK),
        "Tab" => Some(vk::TAB),
        "Space" => Some(vk::SPACE),
        "ArrowLeft" => Some(vk::LEFT),
        "ArrowUp" => Some(vk::UP),
        "ArrowRight" => Some(vk::RIGHT),
        "ArrowDown" => Some(vk::DOWN),
        "Insert" => Some(vk::INSERT),
        "Delete" => Some(vk::DELETE),
        "Home" => Some(vk::HOME),
        "End" => Some(vk::END),
        "PageUp" => Some(vk::PRIOR),
        "PageDown" => Some(vk::NEXT),
        "CapsLock" => Some(vk::CAPITAL),
        "PrintScreen" => Some(vk::SNAPSHOT),
        "Pause" => Some(vk::PAUSE),
        "ContextMenu" => Some(vk::APPS),
        _ => None,
    }
}
