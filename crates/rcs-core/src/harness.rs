//! Recording injector and fixed display for exercising the executor and the
//! session manager without touching the OS.

use std::sync::{Arc, Mutex};

use crate::executor::{DisplayBounds, DisplayBoundsProvider, Executor, InputError, InputInjector};
use crate::input::MouseButton;
use crate::keymap::VirtualKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injected {
    Move(i32, i32),
    Button(MouseButton, bool),
    Wheel(i32),
    Key(VirtualKey, bool),
    ReleaseAll,
}

#[derive(Debug, Default)]
struct LogInner {
    events: Vec<Injected>,
    fail_after: Option<usize>,
}

/// Shared view of everything a [`RecordingInjector`] has injected.
#[derive(Debug, Clone, Default)]
pub struct InjectionLog {
    inner: Arc<Mutex<LogInner>>,
}

impl InjectionLog {
    pub fn events(&self) -> Vec<Injected> {
        self.lock().events.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    pub fn clear(&self) {
        self.lock().events.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, event: Injected) -> Result<(), InputError> {
        let mut inner = self.lock();
        if let Some(n) = inner.fail_after {
            if inner.events.len() >= n {
                return Err(InputError::InjectionFailed("injected failure".into()));
            }
        }
        inner.events.push(event);
        Ok(())
    }
}

/// Injector that records calls instead of performing them.
#[derive(Debug, Clone, Default)]
pub struct RecordingInjector {
    log: InjectionLog,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> InjectionLog {
        self.log.clone()
    }

    /// Fail every call once `n` events have been recorded. `release_all`
    /// is exempt.
    pub fn fail_after(&self, n: usize) {
        self.log.lock().fail_after = Some(n);
    }
}

impl InputInjector for RecordingInjector {
    fn move_to(&mut self, x: i32, y: i32, _bounds: &DisplayBounds) -> Result<(), InputError> {
        self.log.record(Injected::Move(x, y))
    }

    fn button(&mut self, button: MouseButton, down: bool) -> Result<(), InputError> {
        self.log.record(Injected::Button(button, down))
    }

    fn wheel(&mut self, delta: i32) -> Result<(), InputError> {
        self.log.record(Injected::Wheel(delta))
    }

    fn key(&mut self, key: VirtualKey, down: bool) -> Result<(), InputError> {
        self.log.record(Injected::Key(key, down))
    }

    fn release_all(&mut self) -> Result<(), InputError> {
        self.log.lock().events.push(Injected::ReleaseAll);
        Ok(())
    }
}

/// Display provider that always reports the same bounds.
#[derive(Debug, Clone, Copy)]
pub struct FixedDisplay(pub DisplayBounds);

impl DisplayBoundsProvider for FixedDisplay {
    fn primary_bounds(&self) -> Result<DisplayBounds, InputError> {
        Ok(self.0)
    }
}

/// Executor over a recording injector and a fixed 1920x1080 primary display.
pub fn recording_executor() -> (Executor<RecordingInjector, FixedDisplay>, InjectionLog) {
    let injector = RecordingInjector::new();
    let log = injector.log();
    (
        Executor::new(injector, FixedDisplay(DisplayBounds::new(0, 0, 1920, 1080))),
        log,
    )
}
