//! Hook strategy on Windows: `WH_KEYBOARD_LL` and `WH_MOUSE_LL`
//!
//! Low-level hook procs receive no user data, so presses are routed through
//! a process-global [`PressRouter`]. Only one [`LowLevelHook`] should exist.
//! Events are always passed on to the next hook; the cycler observes input
//! but never swallows it.

use std::ptr;
use std::sync::{Mutex, PoisonError};
use tracing::info;
use windows_sys::Win32::Foundation::{ERROR_ACCESS_DENIED, GetLastError, LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT, LLKHF_INJECTED, LLMHF_INJECTED, MSLLHOOKSTRUCT,
    SetWindowsHookExW, UnhookWindowsHookEx, WH_KEYBOARD_LL, WH_MOUSE_LL, WM_KEYDOWN, WM_KEYUP, WM_MBUTTONDOWN,
    WM_SYSKEYDOWN, WM_SYSKEYUP, WM_XBUTTONDOWN, XBUTTON1, XBUTTON2,
};

use super::{LoopBody, MessageLoop, held_modifiers};
use crate::hotkey::{CaptureSink, HotkeyCombo, HotkeyStrategy, Key, MouseButton, StrategyError, StrategyKind, TriggerSink};
use crate::platform::PressRouter;

static ROUTER: PressRouter = PressRouter::new();

/// Virtual keys currently down, to tell auto-repeat from a fresh press
static DOWN: Mutex<Vec<u32>> = Mutex::new(Vec::new());

fn on_key(message: u32, vk: u32) {
    let mut down = DOWN.lock().unwrap_or_else(PoisonError::into_inner);
    match message {
        WM_KEYDOWN | WM_SYSKEYDOWN => {
            if down.contains(&vk) {
                return;
            }
            down.push(vk);
            drop(down);
            if let Some(key) = u16::try_from(vk).ok().and_then(Key::from_vk) {
                ROUTER.press(HotkeyCombo::key(key).with_modifiers(held_modifiers()));
            }
        }
        WM_KEYUP | WM_SYSKEYUP => down.retain(|&held| held != vk),
        _ => {}
    }
}

fn on_mouse(message: u32, mouse_data: u32) {
    let button = match message {
        WM_MBUTTONDOWN => Some(MouseButton::Middle),
        WM_XBUTTONDOWN => match (mouse_data >> 16) as u16 {
            XBUTTON1 => Some(MouseButton::Side1),
            XBUTTON2 => Some(MouseButton::Side2),
            _ => None,
        },
        _ => None,
    };
    if let Some(button) = button {
        ROUTER.press(HotkeyCombo::mouse(button).with_modifiers(held_modifiers()));
    }
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let event = unsafe { &*(lparam as *const KBDLLHOOKSTRUCT) };
        if event.flags & LLKHF_INJECTED == 0 {
            on_key(wparam as u32, event.vkCode);
        }
    }
    unsafe { CallNextHookEx(ptr::null_mut(), code, wparam, lparam) }
}

unsafe extern "system" fn mouse_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let event = unsafe { &*(lparam as *const MSLLHOOKSTRUCT) };
        if event.flags & LLMHF_INJECTED == 0 {
            on_mouse(wparam as u32, event.mouseData);
        }
    }
    unsafe { CallNextHookEx(ptr::null_mut(), code, wparam, lparam) }
}

fn install_error() -> StrategyError {
    let code = unsafe { GetLastError() };
    if code == ERROR_ACCESS_DENIED {
        StrategyError::PermissionDenied(format!("SetWindowsHookExW refused (os error {code})"))
    } else {
        StrategyError::Platform(format!("SetWindowsHookExW failed (os error {code})"))
    }
}

struct Hooks {
    keyboard: HHOOK,
    mouse: HHOOK,
}

impl Hooks {
    fn install() -> Result<Self, StrategyError> {
        let keyboard = unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), ptr::null_mut(), 0) };
        if keyboard.is_null() {
            return Err(install_error());
        }
        let mouse = unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_proc), ptr::null_mut(), 0) };
        if mouse.is_null() {
            let e = install_error();
            unsafe { UnhookWindowsHookEx(keyboard) };
            return Err(e);
        }
        info!("Low-level keyboard and mouse hooks installed");
        Ok(Self { keyboard, mouse })
    }
}

impl LoopBody for Hooks {
    fn teardown(&mut self) {
        unsafe {
            UnhookWindowsHookEx(self.keyboard);
            UnhookWindowsHookEx(self.mouse);
        }
        DOWN.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[derive(Default)]
pub struct LowLevelHook {
    thread: Option<MessageLoop>,
}

impl LowLevelHook {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_running(&mut self) -> Result<(), StrategyError> {
        if self.thread.is_none() {
            self.thread = Some(MessageLoop::spawn("ll-hook", Hooks::install)?);
        }
        Ok(())
    }

    /// Uninstall the hooks once nobody listens
    fn stop_if_idle(&mut self) {
        if ROUTER.is_idle()
            && let Some(mut thread) = self.thread.take()
        {
            thread.stop();
        }
    }
}

impl HotkeyStrategy for LowLevelHook {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hook
    }

    fn try_arm(&mut self, combo: HotkeyCombo, sink: TriggerSink) -> Result<(), StrategyError> {
        self.ensure_running()?;
        ROUTER.arm(combo, sink);
        info!(combo = %combo, "Hotkey hooked");
        Ok(())
    }

    fn try_disarm(&mut self) -> Result<(), StrategyError> {
        ROUTER.idle();
        self.stop_if_idle();
        Ok(())
    }

    fn try_capture(&mut self, sink: CaptureSink) -> Result<(), StrategyError> {
        self.ensure_running()?;
        ROUTER.capture(sink);
        Ok(())
    }

    fn stop_capture(&mut self) {
        ROUTER.idle();
        self.stop_if_idle();
    }
}
