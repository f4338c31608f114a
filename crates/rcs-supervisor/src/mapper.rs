//! Maps local pointer and key events onto normalized input commands.
//!
//! The remote frame is drawn aspect-correct inside the viewport, so there may
//! be letterbox or pillarbox bars around it. Pointer events are normalized
//! against the drawn frame only; events on the bars are discarded.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rcs_core::input::MouseButton;
use rcs_core::{InputCommand, KeyPress};

/// Minimum spacing between two emitted pointer moves.
pub const MOVE_INTERVAL: Duration = Duration::from_millis(24);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x <= self.x + self.width && p.y <= self.y + self.height
    }
}

/// Pixel size of the last remote frame received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

/// Largest rectangle with the frame's aspect ratio centered in `viewport`.
pub fn fit_rect(viewport: Rect, frame: FrameSize) -> Option<Rect> {
    if viewport.is_empty() || frame.width == 0 || frame.height == 0 {
        return None;
    }
    let (fw, fh) = (f64::from(frame.width), f64::from(frame.height));
    let scale = (viewport.width / fw).min(viewport.height / fh);
    let (w, h) = (fw * scale, fh * scale);
    Some(Rect::new(
        viewport.x + (viewport.width - w) / 2.0,
        viewport.y + (viewport.height - h) / 2.0,
        w,
        h,
    ))
}

/// Tracking key for a pressed key: the physical code when present.
fn key_id(press: &KeyPress) -> Option<String> {
    press.code.clone().or_else(|| press.key.clone())
}

pub struct InputMapper {
    viewport: Option<Rect>,
    frame: Option<FrameSize>,
    move_interval: Duration,
    last_move: Option<Instant>,
    pressed: BTreeMap<String, KeyPress>,
}

impl Default for InputMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl InputMapper {
    pub fn new() -> Self {
        Self::with_move_interval(MOVE_INTERVAL)
    }

    pub fn with_move_interval(move_interval: Duration) -> Self {
        Self {
            viewport: None,
            frame: None,
            move_interval,
            last_move: None,
            pressed: BTreeMap::new(),
        }
    }

    pub fn set_viewport(&mut self, viewport: Rect) {
        self.viewport = Some(viewport);
    }

    pub fn set_frame_size(&mut self, width: u32, height: u32) {
        self.frame = Some(FrameSize { width, height });
    }

    pub fn fit_rect(&self) -> Option<Rect> {
        fit_rect(self.viewport?, self.frame?)
    }

    /// Normalize a viewport position, or `None` when it is off the frame.
    pub fn normalize(&self, pos: Point) -> Option<(f64, f64)> {
        let fit = self.fit_rect()?;
        if !pos.x.is_finite() || !pos.y.is_finite() || !fit.contains(pos) {
            return None;
        }
        let x = ((pos.x - fit.x) / fit.width).clamp(0.0, 1.0);
        let y = ((pos.y - fit.y) / fit.height).clamp(0.0, 1.0);
        Some((x, y))
    }

    /// Throttled: at most one move per interval, measured from the last one
    /// emitted.
    pub fn pointer_moved(&mut self, pos: Point, now: Instant) -> Option<InputCommand> {
        let (x, y) = self.normalize(pos)?;
        if let Some(last) = self.last_move {
            if now.saturating_duration_since(last) < self.move_interval {
                return None;
            }
        }
        self.last_move = Some(now);
        Some(InputCommand::MouseMove { x, y })
    }

    pub fn button(&mut self, pos: Point, button: MouseButton, down: bool) -> Option<InputCommand> {
        let (x, y) = self.normalize(pos)?;
        Some(if down {
            InputCommand::MouseDown { x, y, button }
        } else {
            InputCommand::MouseUp { x, y, button }
        })
    }

    pub fn wheel(&mut self, pos: Point, delta: i32) -> Option<InputCommand> {
        let (x, y) = self.normalize(pos)?;
        Some(InputCommand::MouseWheel { x, y, delta })
    }

    /// Keys are not positional and always produce a command. Presses without
    /// a key or a code are dropped.
    pub fn key(&mut self, press: KeyPress, down: bool) -> Option<InputCommand> {
        let id = key_id(&press)?;
        if down {
            self.pressed.insert(id, press.clone());
            Some(InputCommand::KeyDown(press))
        } else {
            self.pressed.remove(&id);
            Some(InputCommand::KeyUp(press))
        }
    }

    pub fn pressed_count(&self) -> usize {
        self.pressed.len()
    }

    /// `KeyUp` for every key still held, without modifier wrapping.
    pub fn release_all(&mut self) -> Vec<InputCommand> {
        std::mem::take(&mut self.pressed)
            .into_values()
            .map(|press| {
                InputCommand::KeyUp(KeyPress {
                    ctrl: false,
                    alt: false,
                    shift: false,
                    ..press
                })
            })
            .collect()
    }

    /// Forget held keys without emitting anything.
    pub fn clear(&mut self) {
        self.pressed.clear();
        self.last_move = None;
    }
}
