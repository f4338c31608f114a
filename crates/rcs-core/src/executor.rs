//! Input executor: turns one normalized command into physical input.
//!
//! The executor has no notion of sessions. The session manager only hands it
//! commands whose session id matches the approved session.
//!
//! Pointer coordinates are resolved against the physical pixel bounds of the
//! primary display, never the virtual desktop or a DPI-scaled logical size.

use thiserror::Error;
use tracing::{debug, warn};

use crate::input::{InputCommand, KeyPress, MouseButton};
use crate::keymap::{self, KeyStroke, Modifier, VirtualKey};

/// Largest wheel delta accepted in either direction (ten 120-unit notches).
pub const MAX_WHEEL_DELTA: i32 = 1200;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("primary display bounds unavailable: {0}")]
    DisplayUnavailable(String),
    #[error("input injection failed: {0}")]
    InjectionFailed(String),
    #[error("input backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Physical pixel rectangle of a display in desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayBounds {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl DisplayBounds {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Pixel offset inside the display for normalized `(x, y)`, clamped to
    /// `[0, width-1] x [0, height-1]`.
    pub fn to_local_pixels(&self, x: f64, y: f64) -> (u32, u32) {
        (normalized_to_pixel(x, self.width), normalized_to_pixel(y, self.height))
    }

    /// Desktop coordinates for normalized `(x, y)`.
    pub fn to_desktop_pixels(&self, x: f64, y: f64) -> (i32, i32) {
        let (px, py) = self.to_local_pixels(x, y);
        (
            self.left.saturating_add(px as i32),
            self.top.saturating_add(py as i32),
        )
    }
}

/// Map a `[0,1]` fraction onto `[0, extent-1]`. Out-of-range and non-finite
/// fractions are clamped.
pub fn normalized_to_pixel(fraction: f64, extent: u32) -> u32 {
    if extent == 0 {
        return 0;
    }
    let max = extent - 1;
    let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
    let px = (fraction * f64::from(extent)).floor();
    (px as u32).min(max)
}

/// Source of the primary display's physical bounds.
pub trait DisplayBoundsProvider: Send {
    fn primary_bounds(&self) -> Result<DisplayBounds, InputError>;
}

/// Platform input backend. Calls map one-to-one onto OS injection calls.
pub trait InputInjector: Send {
    /// Move the cursor to desktop pixel `(x, y)` on the display `bounds`.
    fn move_to(&mut self, x: i32, y: i32, bounds: &DisplayBounds) -> Result<(), InputError>;

    fn button(&mut self, button: MouseButton, down: bool) -> Result<(), InputError>;

    /// Vertical wheel in 120-unit notches; positive scrolls away from the user.
    fn wheel(&mut self, delta: i32) -> Result<(), InputError>;

    fn key(&mut self, key: VirtualKey, down: bool) -> Result<(), InputError>;

    /// Character to key translation for the active layout.
    fn translate_char(&self, ch: char) -> Option<KeyStroke> {
        keymap::ascii_to_key(ch)
    }

    /// Release every key and button this injector still holds down.
    fn release_all(&mut self) -> Result<(), InputError>;
}

/// Anything that can carry out a normalized command.
pub trait InputExecutor: Send {
    fn execute(&mut self, command: &InputCommand) -> Result<(), InputError>;

    /// Release held keys and buttons, e.g. when a session ends.
    fn release_all(&mut self) -> Result<(), InputError>;
}

impl<T: InputExecutor + ?Sized> InputExecutor for Box<T> {
    fn execute(&mut self, command: &InputCommand) -> Result<(), InputError> {
        (**self).execute(command)
    }

    fn release_all(&mut self) -> Result<(), InputError> {
        (**self).release_all()
    }
}

/// Executor over a platform injector and a primary-display bounds provider.
pub struct Executor<I, D> {
    injector: I,
    display: D,
}

impl<I: InputInjector, D: DisplayBoundsProvider> Executor<I, D> {
    pub fn new(injector: I, display: D) -> Self {
        Self { injector, display }
    }

    pub fn injector(&self) -> &I {
        &self.injector
    }

    fn move_pointer(&mut self, x: f64, y: f64) -> Result<(), InputError> {
        // re-read every time so resolution changes mid-session are honored
        let bounds = self.display.primary_bounds()?;
        let (px, py) = bounds.to_desktop_pixels(x, y);
        self.injector.move_to(px, py, &bounds)
    }

    fn resolve(&self, press: &KeyPress) -> Option<KeyStroke> {
        press
            .code
            .as_deref()
            .and_then(keymap::vk_from_code)
            .map(KeyStroke::plain)
            .or_else(|| {
                press
                    .key
                    .as_deref()
                    .and_then(keymap::vk_from_key_label)
                    .map(KeyStroke::plain)
            })
            .or_else(|| {
                press
                    .key
                    .as_deref()
                    .and_then(keymap::single_char)
                    .and_then(|ch| self.injector.translate_char(ch))
            })
    }

    fn key_event(&mut self, press: &KeyPress, down: bool) -> Result<(), InputError> {
        let Some(stroke) = self.resolve(press) else {
            warn!(key = ?press.key, code = ?press.code, "unresolvable key, skipping");
            return Ok(());
        };

        let own_family = keymap::modifier_family(stroke.vk);
        let modifiers: Vec<VirtualKey> = [
            (press.ctrl, Modifier::Ctrl),
            (press.alt, Modifier::Alt),
            (press.shift || stroke.shift, Modifier::Shift),
        ]
        .into_iter()
        .filter(|(held, family)| *held && own_family != Some(*family))
        .map(|(_, family)| family.vk())
        .collect();

        for m in &modifiers {
            self.injector.key(*m, true)?;
        }
        let primary = self.injector.key(stroke.vk, down);
        let mut released = Ok(());
        for m in modifiers.iter().rev() {
            if let Err(e) = self.injector.key(*m, false) {
                released = released.and(Err(e));
            }
        }
        primary.and(released)
    }
}

impl<I: InputInjector, D: DisplayBoundsProvider> InputExecutor for Executor<I, D> {
    fn execute(&mut self, command: &InputCommand) -> Result<(), InputError> {
        match command {
            InputCommand::MouseMove { x, y } => self.move_pointer(*x, *y),
            InputCommand::MouseDown { x, y, button } => {
                self.move_pointer(*x, *y)?;
                self.injector.button(*button, true)
            }
            InputCommand::MouseUp { x, y, button } => {
                self.move_pointer(*x, *y)?;
                self.injector.button(*button, false)
            }
            InputCommand::MouseWheel { x, y, delta } => {
                let clamped = (*delta).clamp(-MAX_WHEEL_DELTA, MAX_WHEEL_DELTA);
                if clamped != *delta {
                    debug!(delta, clamped, "wheel delta clamped");
                }
                self.move_pointer(*x, *y)?;
                self.injector.wheel(clamped)
            }
            InputCommand::KeyDown(press) => self.key_event(press, true),
            InputCommand::KeyUp(press) => self.key_event(press, false),
        }
    }

    fn release_all(&mut self) -> Result<(), InputError> {
        self.injector.release_all()
    }
}
