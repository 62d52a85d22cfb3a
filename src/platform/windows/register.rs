use std::ptr;
use tracing::info;
use windows_sys::Win32::Foundation::{ERROR_HOTKEY_ALREADY_REGISTERED, GetLastError};
use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
    HOT_KEY_MODIFIERS, MOD_ALT, MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT, RegisterHotKey, UnregisterHotKey,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{MSG, WM_HOTKEY};

use super::{LoopBody, MessageLoop};
use crate::constants::windows;
use crate::hotkey::{CaptureSink, HotkeyCombo, HotkeyStrategy, Modifiers, StrategyError, StrategyKind, Trigger, TriggerSink};

fn hotkey_modifiers(modifiers: Modifiers) -> HOT_KEY_MODIFIERS {
    let mut flags = MOD_NOREPEAT;
    if modifiers.ctrl {
        flags |= MOD_CONTROL;
    }
    if modifiers.alt {
        flags |= MOD_ALT;
    }
    if modifiers.shift {
        flags |= MOD_SHIFT;
    }
    flags
}

struct Registration {
    sink: TriggerSink,
}

impl LoopBody for Registration {
    fn on_message(&mut self, msg: &MSG) {
        if msg.message == WM_HOTKEY && msg.wParam == windows::HOTKEY_ID as usize {
            self.sink.fire();
        }
    }

    fn teardown(&mut self) {
        unsafe { UnregisterHotKey(ptr::null_mut(), windows::HOTKEY_ID) };
    }
}

/// Native registration through `RegisterHotKey`; keyboard triggers only
#[derive(Default)]
pub struct RegisteredHotkey {
    thread: Option<MessageLoop>,
}

impl RegisteredHotkey {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HotkeyStrategy for RegisteredHotkey {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NativeRegistration
    }

    fn supports(&self, combo: &HotkeyCombo) -> bool {
        !combo.trigger.is_mouse()
    }

    fn try_arm(&mut self, combo: HotkeyCombo, sink: TriggerSink) -> Result<(), StrategyError> {
        self.try_disarm()?;
        let Trigger::Key(key) = combo.trigger else {
            return Err(StrategyError::Unsupported("mouse buttons cannot be registered".to_string()));
        };
        let modifiers = hotkey_modifiers(combo.modifiers);
        let vk = u32::from(key.spec().vk);

        self.thread = Some(MessageLoop::spawn("hotkey-registration", move || {
            if unsafe { RegisterHotKey(ptr::null_mut(), windows::HOTKEY_ID, modifiers, vk) } == 0 {
                let code = unsafe { GetLastError() };
                return Err(if code == ERROR_HOTKEY_ALREADY_REGISTERED {
                    StrategyError::Conflict
                } else {
                    StrategyError::Platform(format!("RegisterHotKey failed (os error {code})"))
                });
            }
            Ok(Registration { sink })
        })?);
        info!(combo = %combo, "Hotkey registered");
        Ok(())
    }

    fn try_disarm(&mut self) -> Result<(), StrategyError> {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
        }
        Ok(())
    }

    fn try_capture(&mut self, _sink: CaptureSink) -> Result<(), StrategyError> {
        Err(StrategyError::Unsupported("registered hotkeys cannot capture input".to_string()))
    }

    fn stop_capture(&mut self) {}
}
