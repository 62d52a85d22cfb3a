//! Polling fallback: samples the server keymap and pointer state

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{error, info};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use super::{Keymap, connect_root, modifiers_from_state};
use crate::constants::hotkey;
use crate::hotkey::{
    CaptureSink, HotkeyCombo, HotkeyStrategy, Key, Modifiers, MouseButton, StrategyError, StrategyKind, Trigger,
    TriggerSink,
};
use crate::platform::{Listener, PlatformError};

/// One sample of input state
#[derive(Clone, Copy)]
struct Sample {
    keys: [u8; 32],
    pointer: u16,
}

impl Sample {
    fn take(conn: &RustConnection, root: Window) -> Result<Self, PlatformError> {
        let keys = conn.query_keymap()?.reply()?.keys;
        let pointer = u16::from(conn.query_pointer(root)?.reply()?.mask);
        Ok(Self { keys, pointer })
    }

    fn key_down(&self, keycode: Keycode) -> bool {
        self.keys[usize::from(keycode / 8)] & (1 << (keycode % 8)) != 0
    }

    fn middle_down(&self) -> bool {
        self.pointer & u16::from(KeyButMask::BUTTON2) != 0
    }

    fn modifiers(&self) -> Modifiers {
        modifiers_from_state(self.pointer)
    }
}

#[derive(Debug, Clone, Copy)]
enum Probe {
    Key(Keycode),
    Middle,
}

impl Probe {
    fn is_down(self, sample: &Sample) -> bool {
        match self {
            Probe::Key(keycode) => sample.key_down(keycode),
            Probe::Middle => sample.middle_down(),
        }
    }
}

/// Run `on_sample` every poll interval until stopped or the connection fails
fn poll_loop(conn: &RustConnection, root: Window, stop: &AtomicBool, mut on_sample: impl FnMut(&Sample)) {
    let interval = Duration::from_millis(hotkey::POLL_INTERVAL_MS);
    while !stop.load(Ordering::SeqCst) {
        match Sample::take(conn, root) {
            Ok(sample) => on_sample(&sample),
            Err(e) => {
                error!(error = %e, "Input polling failed");
                break;
            }
        }
        thread::sleep(interval);
    }
}

fn serve_trigger(conn: RustConnection, root: Window, probe: Probe, combo: HotkeyCombo, sink: TriggerSink, stop: Arc<AtomicBool>) {
    // Held at arm time counts as already down
    let mut was_down = true;
    poll_loop(&conn, root, &stop, |sample| {
        let down = probe.is_down(sample);
        if down && !was_down && sample.modifiers() == combo.modifiers {
            sink.fire();
        }
        was_down = down;
    });
}

fn serve_capture(conn: RustConnection, root: Window, keys: Vec<(Key, Keycode)>, sink: CaptureSink, stop: Arc<AtomicBool>) {
    let mut previous: Option<Sample> = None;
    poll_loop(&conn, root, &stop, |sample| {
        if let Some(before) = &previous {
            let pressed = keys
                .iter()
                .find(|&&(_, keycode)| sample.key_down(keycode) && !before.key_down(keycode))
                .map(|&(key, _)| HotkeyCombo::key(key))
                .or_else(|| (sample.middle_down() && !before.middle_down()).then(|| HotkeyCombo::mouse(MouseButton::Middle)));
            if let Some(combo) = pressed {
                sink.offer(combo.with_modifiers(sample.modifiers()));
            }
        }
        previous = Some(*sample);
    });
}

#[derive(Default)]
pub struct PollStrategy {
    armed: Option<Listener>,
    capture: Option<Listener>,
}

impl PollStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HotkeyStrategy for PollStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Polling
    }

    /// The core pointer mask only reports buttons 1 to 5
    fn supports(&self, combo: &HotkeyCombo) -> bool {
        !matches!(combo.trigger, Trigger::Mouse(MouseButton::Side1 | MouseButton::Side2))
    }

    fn try_arm(&mut self, combo: HotkeyCombo, sink: TriggerSink) -> Result<(), StrategyError> {
        self.try_disarm()?;
        let (conn, root) = connect_root()?;
        let probe = match combo.trigger {
            Trigger::Key(key) => Keymap::load(&conn)?
                .keycode(key.spec().keysym)
                .map(Probe::Key)
                .ok_or_else(|| StrategyError::Unsupported(format!("no keycode produces {}", key.label())))?,
            Trigger::Mouse(MouseButton::Middle) => Probe::Middle,
            Trigger::Mouse(button) => {
                return Err(StrategyError::Unsupported(format!("{} cannot be polled", button.label())));
            }
        };

        self.armed = Some(Listener::spawn("x11-poll", move |stop| {
            serve_trigger(conn, root, probe, combo, sink, stop)
        })?);
        info!(combo = %combo, "Polling for hotkey");
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
        let keys: Vec<(Key, Keycode)> = Key::ALL
            .iter()
            .filter_map(|&key| keymap.keycode(key.spec().keysym).map(|keycode| (key, keycode)))
            .collect();
        self.capture = Some(Listener::spawn("x11-poll-capture", move |stop| {
            serve_capture(conn, root, keys, sink, stop)
        })?);
        Ok(())
    }

    fn stop_capture(&mut self) {
        if let Some(mut listener) = self.capture.take() {
            listener.stop();
        }
    }
}
