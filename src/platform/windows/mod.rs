//! Windows backend
//!
//! Windows come from `EnumWindows`, activation uses the foreground APIs
//! with `AttachThreadInput` and `SendInput`, and hotkeys are observed through
//! low-level hooks, `RegisterHotKey` or `GetAsyncKeyState` polling.

mod focus;
mod hook;
mod poll;
mod register;
mod source;

use std::ptr;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{GetLastError, HWND};
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::Input::KeyboardAndMouse::{GetAsyncKeyState, VK_CONTROL, VK_MENU, VK_SHIFT};
use windows_sys::Win32::UI::WindowsAndMessaging::{GetMessageW, MSG, PM_NOREMOVE, PeekMessageW, PostThreadMessageW, WM_QUIT};

pub use focus::Win32Focus;
pub use hook::LowLevelHook;
pub use poll::AsyncKeyPoll;
pub use register::RegisteredHotkey;
pub use source::Win32Source;

use super::{NativePlatform, PlatformError};
use crate::hotkey::{Modifiers, StrategyError};
use crate::types::WindowHandle;

pub(crate) fn hwnd(handle: WindowHandle) -> HWND {
    handle.0 as usize as HWND
}

pub(crate) fn handle_of(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd as usize as u64)
}

pub(crate) fn last_error(api: &'static str) -> PlatformError {
    PlatformError::Api(api, unsafe { GetLastError() })
}

/// Whether the virtual key is physically down right now
pub(crate) fn key_down(vk: u16) -> bool {
    unsafe { GetAsyncKeyState(i32::from(vk)) } < 0
}

pub(crate) fn held_modifiers() -> Modifiers {
    Modifiers {
        ctrl: key_down(VK_CONTROL),
        alt: key_down(VK_MENU),
        shift: key_down(VK_SHIFT),
    }
}

/// State owned by a message loop thread
pub(crate) trait LoopBody {
    fn on_message(&mut self, msg: &MSG) {
        let _ = msg;
    }

    /// Runs on the loop thread after WM_QUIT
    fn teardown(&mut self);
}

/// Background thread pumping a Win32 message queue.
///
/// Hooks and thread hotkeys deliver through the queue of the thread that
/// installed them, so installation happens on the loop thread itself.
pub(crate) struct MessageLoop {
    name: &'static str,
    thread_id: u32,
    handle: Option<JoinHandle<()>>,
}

impl MessageLoop {
    /// Run `install` on a new thread and pump messages into the returned
    /// body until stopped. Fails with `install`'s error.
    pub(crate) fn spawn<B, F>(name: &'static str, install: F) -> Result<Self, StrategyError>
    where
        B: LoopBody,
        F: FnOnce() -> Result<B, StrategyError> + Send + 'static,
    {
        let (status_tx, status_rx) = mpsc::channel::<Result<u32, StrategyError>>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut msg: MSG = unsafe { std::mem::zeroed() };
                // Creates this thread's queue before anyone can post to it
                unsafe { PeekMessageW(&mut msg, ptr::null_mut(), 0, 0, PM_NOREMOVE) };

                let mut body = match install() {
                    Ok(body) => body,
                    Err(e) => {
                        let _ = status_tx.send(Err(e));
                        return;
                    }
                };
                if status_tx.send(Ok(unsafe { GetCurrentThreadId() })).is_err() {
                    body.teardown();
                    return;
                }

                debug!(thread = name, "Message loop running");
                // 0 on WM_QUIT, -1 on error; both end the loop
                while unsafe { GetMessageW(&mut msg, ptr::null_mut(), 0, 0) } > 0 {
                    body.on_message(&msg);
                }
                body.teardown();
                debug!(thread = name, "Message loop exited");
            })
            .map_err(|e| StrategyError::Platform(format!("failed to spawn {name} thread: {e}")))?;

        match status_rx.recv() {
            Ok(Ok(thread_id)) => Ok(Self {
                name,
                thread_id,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(StrategyError::Platform(format!("{name} thread exited during setup")))
            }
        }
    }

    pub(crate) fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0) } == 0 {
            warn!(thread = self.name, error = %last_error("PostThreadMessageW"), "Failed to stop message loop");
            return;
        }
        if handle.join().is_err() {
            warn!(thread = self.name, "Message loop thread panicked");
        }
    }
}

impl Drop for MessageLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn native() -> Result<NativePlatform, PlatformError> {
    Ok(NativePlatform {
        source: Arc::new(Win32Source),
        focus: Arc::new(Win32Focus::new()),
        strategies: vec![
            Box::new(LowLevelHook::new()),
            Box::new(RegisteredHotkey::new()),
            Box::new(AsyncKeyPoll::new()),
        ],
    })
}
