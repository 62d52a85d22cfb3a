//! Native registration: passive key/button grabs on the root window
//!
//! Each session opens its own connection so the grab events are only ever
//! read by the listener thread that owns it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::*;
use x11rb::protocol::{ErrorKind, Event};
use x11rb::rust_connection::RustConnection;

use super::{Keymap, connect_root, modifier_mask, modifiers_from_state};
use crate::constants::hotkey;
use crate::hotkey::{CaptureSink, HotkeyCombo, HotkeyStrategy, Key, MouseButton, StrategyError, StrategyKind, Trigger, TriggerSink};
use crate::platform::{Listener, PlatformError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrabTarget {
    Key(Keycode),
    Button(u8),
}

/// Lock-key states a grab must also cover (none, CapsLock, NumLock, both)
fn lock_variants() -> [u16; 4] {
    let caps = u16::from(ModMask::LOCK);
    let num = u16::from(ModMask::M2);
    [0, caps, num, caps | num]
}

fn grab(conn: &RustConnection, root: Window, target: GrabTarget, base: u16) -> Result<(), StrategyError> {
    for extra in lock_variants() {
        let modifiers = ModMask::from(base | extra);
        let cookie = match target {
            GrabTarget::Key(keycode) => {
                conn.grab_key(true, root, modifiers, keycode, GrabMode::ASYNC, GrabMode::ASYNC)
            }
            GrabTarget::Button(button) => conn.grab_button(
                false,
                root,
                EventMask::BUTTON_PRESS,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                ButtonIndex::from(button),
                modifiers,
            ),
        }
        .map_err(PlatformError::from)?;

        if let Err(e) = cookie.check() {
            ungrab(conn, root, target, base);
            return Err(match e {
                ReplyError::X11Error(x11_error) if x11_error.error_kind == ErrorKind::Access => StrategyError::Conflict,
                other => PlatformError::from(other).into(),
            });
        }
    }
    Ok(())
}

fn ungrab(conn: &RustConnection, root: Window, target: GrabTarget, base: u16) {
    for extra in lock_variants() {
        let modifiers = ModMask::from(base | extra);
        let result = match target {
            GrabTarget::Key(keycode) => conn.ungrab_key(keycode, root, modifiers).map(drop),
            GrabTarget::Button(button) => conn.ungrab_button(ButtonIndex::from(button), root, modifiers).map(drop),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to release grab");
        }
    }
    if let Err(e) = conn.flush() {
        warn!(error = %e, "Failed to flush X11 connection after ungrab");
    }
}

/// Read grab events until stopped. Auto-repeat shows up as a release and a
/// press sharing one timestamp; such presses are ignored.
fn serve_grab(conn: RustConnection, root: Window, target: GrabTarget, base: u16, sink: TriggerSink, stop: Arc<AtomicBool>) {
    let idle = Duration::from_millis(hotkey::POLL_INTERVAL_MS);
    let mut last_release = None;
    while !stop.load(Ordering::SeqCst) {
        match conn.poll_for_event() {
            Ok(Some(Event::KeyPress(e))) if GrabTarget::Key(e.detail) == target => {
                if last_release != Some(e.time) {
                    sink.fire();
                }
            }
            Ok(Some(Event::KeyRelease(e))) => last_release = Some(e.time),
            Ok(Some(Event::ButtonPress(e))) if GrabTarget::Button(e.detail) == target => sink.fire(),
            Ok(Some(_)) => {}
            Ok(None) => thread::sleep(idle),
            Err(e) => {
                error!(error = %e, "X11 grab connection lost");
                break;
            }
        }
    }
    ungrab(&conn, root, target, base);
}

fn serve_capture(conn: RustConnection, keymap: Keymap, sink: CaptureSink, stop: Arc<AtomicBool>) {
    let idle = Duration::from_millis(hotkey::POLL_INTERVAL_MS);
    while !stop.load(Ordering::SeqCst) {
        match conn.poll_for_event() {
            Ok(Some(Event::KeyPress(e))) => {
                // Bare modifier presses have no Key and are skipped
                if let Some(key) = keymap.keysym(e.detail).and_then(Key::from_keysym) {
                    sink.offer(HotkeyCombo::key(key).with_modifiers(modifiers_from_state(u16::from(e.state))));
                }
            }
            Ok(Some(Event::ButtonPress(e))) => {
                if let Some(button) = MouseButton::from_x11_button(e.detail) {
                    sink.offer(HotkeyCombo::mouse(button).with_modifiers(modifiers_from_state(u16::from(e.state))));
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => thread::sleep(idle),
            Err(e) => {
                error!(error = %e, "X11 capture connection lost");
                break;
            }
        }
    }
    if let Err(e) = conn
        .ungrab_keyboard(x11rb::CURRENT_TIME)
        .and_then(|_| conn.ungrab_pointer(x11rb::CURRENT_TIME))
        .and_then(|_| conn.flush())
    {
        warn!(error = %e, "Failed to release capture grabs");
    }
}

#[derive(Default)]
pub struct GrabStrategy {
    armed: Option<Listener>,
    capture: Option<Listener>,
}

impl GrabStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HotkeyStrategy for GrabStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NativeRegistration
    }

    fn try_arm(&mut self, combo: HotkeyCombo, sink: TriggerSink) -> Result<(), StrategyError> {
        self.try_disarm()?;
        let (conn, root) = connect_root()?;
        let target = match combo.trigger {
            Trigger::Key(key) => {
                let keycode = Keymap::load(&conn)?
                    .keycode(key.spec().keysym)
                    .ok_or_else(|| StrategyError::Unsupported(format!("no keycode produces {}", key.label())))?;
                GrabTarget::Key(keycode)
            }
            Trigger::Mouse(button) => GrabTarget::Button(button.x11_button()),
        };
        let base = modifier_mask(combo.modifiers);
        grab(&conn, root, target, base)?;
        conn.flush().map_err(PlatformError::from)?;

        debug!(combo = %combo, target = ?target, "Grabbed on root window");
        self.armed = Some(Listener::spawn("x11-grab", move |stop| {
            serve_grab(conn, root, target, base, sink, stop)
        })?);
        info!(combo = %combo, "Hotkey grabbed");
        Ok(())
    }

    fn try_disarm(&mut self) -> Result<(), StrategyError> {
        if let Some(mut listener) = self.armed.take() {
            listener.stop();
        }
        Ok(())
    }

    fn try_capture(&mut self, sink: CaptureSink) -> Result<(), StrategyError> {
        self.stop_capture();
        let (conn, root) = connect_root()?;
        let keymap = Keymap::load(&conn)?;

        let keyboard = conn
            .grab_keyboard(false, root, x11rb::CURRENT_TIME, GrabMode::ASYNC, GrabMode::ASYNC)
            .map_err(PlatformError::from)?
            .reply()
            .map_err(PlatformError::from)?;
        if keyboard.status != GrabStatus::SUCCESS {
            return Err(StrategyError::Conflict);
        }
        let pointer = conn
            .grab_pointer(
                false,
                root,
                EventMask::BUTTON_PRESS,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                x11rb::CURRENT_TIME,
            )
            .map_err(PlatformError::from)?
            .reply()
            .map_err(PlatformError::from)?;
        if pointer.status != GrabStatus::SUCCESS {
            if let Err(e) = conn.ungrab_keyboard(x11rb::CURRENT_TIME).and_then(|_| conn.flush()) {
                warn!(error = %e, "Failed to release keyboard grab");
            }
            return Err(StrategyError::Conflict);
        }

        self.capture = Some(Listener::spawn("x11-capture", move |stop| {
            serve_capture(conn, keymap, sink, stop)
        })?);
        Ok(())
    }

    fn stop_capture(&mut self) {
        if let Some(mut listener) = self.capture.take() {
            listener.stop();
        }
    }
}
