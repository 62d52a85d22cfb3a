//! Operating-system seams
//!
//! The core only talks to the OS through [`WindowSource`], [`FocusControl`]
//! and [`HotkeyStrategy`]. [`native()`] wires up the implementations for the
//! current platform.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::warn;

use crate::hotkey::{CaptureSink, HotkeyCombo, HotkeyStrategy, StrategyError, TriggerSink};
use crate::types::{RawWindow, WindowHandle};

#[cfg(target_os = "linux")]
pub mod evdev;
#[cfg(windows)]
pub mod windows;
#[cfg(target_os = "linux")]
pub mod x11;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("cannot connect to the display server: {0}")]
    Connection(String),

    #[error("display server request failed: {0}")]
    Protocol(String),

    #[error("{0} returned failure (os error {1})")]
    Api(&'static str, u32),

    #[error("window {0} not found")]
    NoSuchWindow(WindowHandle),

    #[error("not supported on this platform: {0}")]
    Unsupported(String),

    #[error("failed to spawn {0} thread: {1}")]
    Thread(&'static str, String),
}

impl From<PlatformError> for StrategyError {
    fn from(e: PlatformError) -> Self {
        StrategyError::Platform(e.to_string())
    }
}

/// Enumerates top-level windows and answers liveness questions
pub trait WindowSource: Send + Sync {
    fn enumerate(&self) -> Result<Vec<RawWindow>, PlatformError>;

    fn window_exists(&self, handle: WindowHandle) -> bool;

    fn process_alive(&self, pid: u32) -> bool;
}

/// Primitives the activation ladder is built from
pub trait FocusControl: Send + Sync {
    fn is_minimized(&self, handle: WindowHandle) -> Result<bool, PlatformError>;

    fn restore(&self, handle: WindowHandle) -> Result<(), PlatformError>;

    /// Ask for `handle` to become the foreground window with input focus
    fn request_foreground(&self, handle: WindowHandle) -> Result<(), PlatformError>;

    fn foreground_window(&self) -> Option<WindowHandle>;

    /// Join the caller's input processing with the target's owning thread.
    /// Returns false when nothing needed attaching.
    fn attach_input(&self, handle: WindowHandle) -> Result<bool, PlatformError>;

    fn detach_input(&self, handle: WindowHandle);

    /// Press (`true`) or release (`false`) a modifier that has no effect on
    /// the game but counts as user input for focus-stealing prevention
    fn set_neutral_modifier(&self, down: bool) -> Result<(), PlatformError>;

    /// Screen coordinates of the window's centre
    fn window_center(&self, handle: WindowHandle) -> Result<(i32, i32), PlatformError>;

    fn click_at(&self, x: i32, y: i32) -> Result<(), PlatformError>;
}

/// Native implementations of every seam
pub struct NativePlatform {
    pub source: Arc<dyn WindowSource>,
    pub focus: Arc<dyn FocusControl>,
    /// Hotkey strategies, any order
    pub strategies: Vec<Box<dyn HotkeyStrategy>>,
}

/// Background listener thread stopped through a shared flag.
///
/// Dropping the listener stops it and waits for the thread to exit.
#[cfg_attr(not(any(target_os = "linux", windows)), allow(dead_code))]
pub(crate) struct Listener {
    name: &'static str,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

#[cfg_attr(not(any(target_os = "linux", windows)), allow(dead_code))]
impl Listener {
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> Result<Self, PlatformError>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))
            .map_err(|e| PlatformError::Thread(name, e.to_string()))?;
        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!(listener = self.name, "Listener thread panicked");
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Route {
    Idle,
    Armed {
        combo: HotkeyCombo,
        sink: TriggerSink,
    },
    Capturing(CaptureSink),
}

/// Delivers presses seen by a global hook to whoever currently listens.
///
/// Hook threads outlive arm/disarm cycles; switching the route under the
/// lock guarantees nothing is reported once a strategy went idle.
#[cfg_attr(not(any(target_os = "linux", windows)), allow(dead_code))]
pub(crate) struct PressRouter {
    route: Mutex<Route>,
}

#[cfg_attr(not(any(target_os = "linux", windows)), allow(dead_code))]
impl PressRouter {
    pub(crate) const fn new() -> Self {
        Self {
            route: Mutex::new(Route::Idle),
        }
    }

    fn route(&self) -> MutexGuard<'_, Route> {
        self.route.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn arm(&self, combo: HotkeyCombo, sink: TriggerSink) {
        *self.route() = Route::Armed { combo, sink };
    }

    pub(crate) fn capture(&self, sink: CaptureSink) {
        *self.route() = Route::Capturing(sink);
    }

    pub(crate) fn idle(&self) {
        *self.route() = Route::Idle;
    }

    #[cfg_attr(not(windows), allow(dead_code))]
    pub(crate) fn is_idle(&self) -> bool {
        matches!(*self.route(), Route::Idle)
    }

    /// A trigger went down with exactly `pressed.modifiers` held
    pub(crate) fn press(&self, pressed: HotkeyCombo) {
        match &*self.route() {
            Route::Armed { combo, sink } if *combo == pressed => sink.fire(),
            Route::Capturing(sink) => sink.offer(pressed),
            _ => {}
        }
    }
}

#[cfg(target_os = "linux")]
pub fn native() -> Result<NativePlatform, PlatformError> {
    x11::native()
}

#[cfg(windows)]
pub fn native() -> Result<NativePlatform, PlatformError> {
    windows::native()
}

#[cfg(not(any(target_os = "linux", windows)))]
pub fn native() -> Result<NativePlatform, PlatformError> {
    Err(PlatformError::Unsupported(std::env::consts::OS.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{Key, Modifiers, MouseButton, StrategyKind};
    use std::sync::mpsc;

    #[test]
    fn test_router_fires_only_for_the_armed_combo() {
        let router = PressRouter::new();
        let (tx, rx) = mpsc::sync_channel(8);
        let combo: HotkeyCombo = "ctrl+mouse4".parse().unwrap();

        router.press(combo);
        router.arm(combo, TriggerSink::new(tx, StrategyKind::Hook));
        router.press(HotkeyCombo::mouse(MouseButton::Side1));
        router.press(combo.with_modifiers(Modifiers {
            shift: true,
            ..combo.modifiers
        }));
        assert!(rx.try_recv().is_err());

        router.press(combo);
        assert_eq!(rx.try_recv().unwrap().strategy, StrategyKind::Hook);

        router.idle();
        assert!(router.is_idle());
        router.press(combo);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_router_offers_everything_while_capturing() {
        let router = PressRouter::new();
        let (tx, rx) = mpsc::sync_channel(8);
        router.capture(CaptureSink::new(tx, StrategyKind::Hook));
        assert!(!router.is_idle());

        let combo = HotkeyCombo::key(Key::F3);
        router.press(combo);
        assert_eq!(rx.try_recv().unwrap(), (StrategyKind::Hook, combo));
    }

    #[test]
    fn test_listener_stops_on_drop() {
        let (tx, rx) = mpsc::channel();
        let listener = Listener::spawn("test", move |stop| {
            while !stop.load(Ordering::SeqCst) {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            tx.send(()).unwrap();
        })
        .unwrap();
        drop(listener);
        assert!(rx.try_recv().is_ok());
    }
}
