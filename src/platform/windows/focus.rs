use std::mem;
use std::ptr;
use std::sync::{Mutex, PoisonError};
use windows_sys::Win32::Foundation::{FALSE, RECT, TRUE};
use windows_sys::Win32::System::Threading::{AttachThreadInput, GetCurrentThreadId};
use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
    INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBD_EVENT_FLAGS, KEYBDINPUT, KEYEVENTF_KEYUP, MOUSE_EVENT_FLAGS,
    MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEINPUT, SendInput, VK_MENU,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    BringWindowToTop, GetForegroundWindow, GetWindowRect, GetWindowThreadProcessId, IsIconic, SW_RESTORE,
    SetCursorPos, SetForegroundWindow, ShowWindow,
};

use super::{handle_of, hwnd, last_error};
use crate::platform::{FocusControl, PlatformError};
use crate::types::WindowHandle;

fn key_input(flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VK_MENU,
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn mouse_input(flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send(inputs: &[INPUT]) -> Result<(), PlatformError> {
    let sent = unsafe { SendInput(inputs.len() as u32, inputs.as_ptr(), mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        return Err(last_error("SendInput"));
    }
    Ok(())
}

/// Foreground control through the Win32 focus APIs
pub struct Win32Focus {
    /// Thread our input queue is currently attached to
    attached: Mutex<Option<u32>>,
}

impl Default for Win32Focus {
    fn default() -> Self {
        Self::new()
    }
}

impl Win32Focus {
    pub fn new() -> Self {
        Self {
            attached: Mutex::new(None),
        }
    }
}

impl FocusControl for Win32Focus {
    fn is_minimized(&self, handle: WindowHandle) -> Result<bool, PlatformError> {
        Ok(unsafe { IsIconic(hwnd(handle)) } != 0)
    }

    fn restore(&self, handle: WindowHandle) -> Result<(), PlatformError> {
        // The return value is the previous visibility, not an error
        unsafe { ShowWindow(hwnd(handle), SW_RESTORE) };
        Ok(())
    }

    fn request_foreground(&self, handle: WindowHandle) -> Result<(), PlatformError> {
        let window = hwnd(handle);
        unsafe { BringWindowToTop(window) };
        if unsafe { SetForegroundWindow(window) } == 0 {
            return Err(last_error("SetForegroundWindow"));
        }
        Ok(())
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        let window = unsafe { GetForegroundWindow() };
        (!window.is_null()).then(|| handle_of(window))
    }

    /// Attach to the thread owning the current foreground window, which is
    /// the one allowed to hand the foreground over
    fn attach_input(&self, _handle: WindowHandle) -> Result<bool, PlatformError> {
        let foreground = unsafe { GetForegroundWindow() };
        if foreground.is_null() {
            return Ok(false);
        }
        let current = unsafe { GetCurrentThreadId() };
        let owner = unsafe { GetWindowThreadProcessId(foreground, ptr::null_mut()) };
        if owner == 0 || owner == current {
            return Ok(false);
        }
        if unsafe { AttachThreadInput(current, owner, TRUE) } == 0 {
            return Err(last_error("AttachThreadInput"));
        }
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner) = Some(owner);
        Ok(true)
    }

    fn detach_input(&self, _handle: WindowHandle) {
        if let Some(owner) = self.attached.lock().unwrap_or_else(PoisonError::into_inner).take() {
            unsafe { AttachThreadInput(GetCurrentThreadId(), owner, FALSE) };
        }
    }

    fn set_neutral_modifier(&self, down: bool) -> Result<(), PlatformError> {
        let flags = if down { 0 } else { KEYEVENTF_KEYUP };
        send(&[key_input(flags)])
    }

    fn window_center(&self, handle: WindowHandle) -> Result<(i32, i32), PlatformError> {
        let mut rect = RECT {
            left: 0,
            top: 0,
            right: 0,
            bottom: 0,
        };
        if unsafe { GetWindowRect(hwnd(handle), &mut rect) } == 0 {
            return Err(last_error("GetWindowRect"));
        }
        Ok(((rect.left + rect.right) / 2, (rect.top + rect.bottom) / 2))
    }

    fn click_at(&self, x: i32, y: i32) -> Result<(), PlatformError> {
        if unsafe { SetCursorPos(x, y) } == 0 {
            return Err(last_error("SetCursorPos"));
        }
        send(&[mouse_input(MOUSEEVENTF_LEFTDOWN), mouse_input(MOUSEEVENTF_LEFTUP)])
    }
}
