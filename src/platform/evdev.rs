//! Hook strategy on Linux: reads key events straight from /dev/input
//!
//! Works under any display server but needs membership of the `input`
//! group. One listener thread per device is started on first use and kept
//! for the life of the process; arming only changes where presses go.

use evdev::{Device, EventType, KeyCode};
use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use tracing::{debug, error, info, warn};

use super::PressRouter;
use crate::constants::{input, paths, permissions};
use crate::hotkey::{
    CaptureSink, HotkeyCombo, HotkeyStrategy, Key, Modifiers, MouseButton, StrategyError, StrategyKind, Trigger,
    TriggerSink,
};

const LEFT_CTRL: u8 = 1 << 0;
const RIGHT_CTRL: u8 = 1 << 1;
const LEFT_ALT: u8 = 1 << 2;
const RIGHT_ALT: u8 = 1 << 3;
const LEFT_SHIFT: u8 = 1 << 4;
const RIGHT_SHIFT: u8 = 1 << 5;

fn modifier_bit(code: u16) -> Option<u8> {
    match KeyCode::new(code) {
        KeyCode::KEY_LEFTCTRL => Some(LEFT_CTRL),
        KeyCode::KEY_RIGHTCTRL => Some(RIGHT_CTRL),
        KeyCode::KEY_LEFTALT => Some(LEFT_ALT),
        KeyCode::KEY_RIGHTALT => Some(RIGHT_ALT),
        KeyCode::KEY_LEFTSHIFT => Some(LEFT_SHIFT),
        KeyCode::KEY_RIGHTSHIFT => Some(RIGHT_SHIFT),
        _ => None,
    }
}

/// State shared by every device thread. Modifiers are tracked across
/// devices so Ctrl on the keyboard combines with a mouse side button.
struct Shared {
    router: PressRouter,
    held: AtomicU8,
}

impl Shared {
    fn new() -> Self {
        Self {
            router: PressRouter::new(),
            held: AtomicU8::new(0),
        }
    }

    fn modifiers(&self) -> Modifiers {
        let held = self.held.load(Ordering::SeqCst);
        Modifiers {
            ctrl: held & (LEFT_CTRL | RIGHT_CTRL) != 0,
            alt: held & (LEFT_ALT | RIGHT_ALT) != 0,
            shift: held & (LEFT_SHIFT | RIGHT_SHIFT) != 0,
        }
    }

    /// Handle one EV_KEY event
    fn observe(&self, code: u16, value: i32) {
        if let Some(bit) = modifier_bit(code) {
            if value == input::KEY_RELEASE {
                self.held.fetch_and(!bit, Ordering::SeqCst);
            } else {
                self.held.fetch_or(bit, Ordering::SeqCst);
            }
            return;
        }

        // Auto-repeat and releases never trigger
        if value != input::KEY_PRESS {
            return;
        }
        let trigger = Key::from_evdev(code)
            .map(Trigger::Key)
            .or_else(|| MouseButton::from_evdev(code).map(Trigger::Mouse));
        if let Some(trigger) = trigger {
            self.router.press(HotkeyCombo::new(trigger, self.modifiers()));
        }
    }
}

/// Which triggers the opened devices can report
#[derive(Debug, Clone, Copy, Default)]
struct Capabilities {
    keyboard: bool,
    middle: bool,
    side: bool,
}

impl Capabilities {
    fn reports(self, trigger: Trigger) -> bool {
        match trigger {
            Trigger::Key(_) => self.keyboard,
            Trigger::Mouse(MouseButton::Middle) => self.middle,
            Trigger::Mouse(_) => self.side,
        }
    }
}

fn permission_hint() -> String {
    format!(
        "cannot read input devices in {}; add yourself to the '{}' group ({}) and log in again",
        paths::DEV_INPUT,
        permissions::INPUT_GROUP,
        permissions::ADD_TO_INPUT_GROUP
    )
}

/// Open every keyboard and mouse under /dev/input
fn open_devices() -> Result<(Vec<Device>, Capabilities), StrategyError> {
    info!(path = %paths::DEV_INPUT, "Scanning for input devices...");
    let entries = fs::read_dir(paths::DEV_INPUT).map_err(|_| StrategyError::PermissionDenied(permission_hint()))?;

    let mut devices = Vec::new();
    let mut caps = Capabilities::default();
    let mut denied = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("event"))
        {
            continue;
        }

        let device = match Device::open(&path) {
            Ok(device) => device,
            Err(e) => {
                if e.kind() == ErrorKind::PermissionDenied {
                    denied += 1;
                }
                debug!(device_path = %path.display(), error = %e, "Cannot open device");
                continue;
            }
        };
        let Some(keys) = device.supported_keys() else {
            continue;
        };
        let keyboard = keys.contains(KeyCode::KEY_TAB);
        let middle = keys.contains(KeyCode::BTN_MIDDLE);
        let side = keys.contains(KeyCode::BTN_SIDE) || keys.contains(KeyCode::BTN_EXTRA);
        if !(keyboard || middle || side) {
            continue;
        }

        info!(device_path = %path.display(), name = ?device.name(), keyboard, middle, side, "Found input device");
        caps.keyboard |= keyboard;
        caps.middle |= middle;
        caps.side |= side;
        devices.push(device);
    }

    if devices.is_empty() {
        if denied > 0 {
            return Err(StrategyError::PermissionDenied(permission_hint()));
        }
        return Err(StrategyError::Unsupported("no keyboard or mouse found".to_string()));
    }

    info!(count = devices.len(), "Listening on input device(s)");
    Ok((devices, caps))
}

/// Blocks on the device until it goes away
fn listen(mut device: Device, shared: Arc<Shared>) {
    let name = device.name().unwrap_or("unnamed").to_string();
    loop {
        let events = match device.fetch_events() {
            Ok(events) => events,
            Err(e) => {
                error!(device = %name, error = %e, "Input device listener stopped");
                return;
            }
        };
        for event in events {
            if event.event_type() == EventType::KEY {
                shared.observe(event.code(), event.value());
            }
        }
    }
}

pub struct EvdevHook {
    shared: Arc<Shared>,
    caps: Option<Capabilities>,
}

impl Default for EvdevHook {
    fn default() -> Self {
        Self::new()
    }
}

impl EvdevHook {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            caps: None,
        }
    }

    fn ensure_listening(&mut self) -> Result<Capabilities, StrategyError> {
        if let Some(caps) = self.caps {
            return Ok(caps);
        }
        let (devices, caps) = open_devices()?;
        for device in devices {
            let shared = self.shared.clone();
            let name = device.name().unwrap_or("unknown").to_string();
            thread::Builder::new()
                .name("evdev-listener".to_string())
                .spawn(move || {
                    info!(device = %name, "Hotkey listener started");
                    listen(device, shared)
                })
                .map_err(|e| StrategyError::Platform(format!("failed to spawn listener: {e}")))?;
        }
        self.caps = Some(caps);
        Ok(caps)
    }
}

impl HotkeyStrategy for EvdevHook {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hook
    }

    fn try_arm(&mut self, combo: HotkeyCombo, sink: TriggerSink) -> Result<(), StrategyError> {
        let caps = self.ensure_listening()?;
        if !caps.reports(combo.trigger) {
            return Err(StrategyError::Unsupported(format!(
                "no input device reports {}",
                combo.trigger.label()
            )));
        }
        self.shared.router.arm(combo, sink);
        info!(combo = %combo, "Hotkey hooked on input devices");
        Ok(())
    }

    fn try_disarm(&mut self) -> Result<(), StrategyError> {
        self.shared.router.idle();
        Ok(())
    }

    fn try_capture(&mut self, sink: CaptureSink) -> Result<(), StrategyError> {
        self.ensure_listening()?;
        self.shared.router.capture(sink);
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.shared.router.idle();
    }
}

/// Check if input devices are readable (user has input group permissions)
pub fn check_permissions() -> bool {
    fs::read_dir(paths::DEV_INPUT).is_ok()
}

/// Explain how to enable the hook strategy
pub fn log_permission_help() {
    warn!(path = %paths::DEV_INPUT, "Cannot access input devices");
    warn!(group = %permissions::INPUT_GROUP, "The input hook requires group membership");
    warn!(command = %permissions::ADD_TO_INPUT_GROUP, "Add user to input group");
    warn!("  Then log out and back in");
}
