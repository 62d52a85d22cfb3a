use std::path::Path;
use tracing::trace;
use windows_sys::Win32::Foundation::{CloseHandle, FALSE, HANDLE, HWND, LPARAM, BOOL, TRUE};
use windows_sys::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION, QueryFullProcessImageNameW,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClassNameW, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsIconic, IsWindow,
    IsWindowVisible,
};

use super::{handle_of, hwnd, last_error};
use crate::constants::windows;
use crate::platform::{PlatformError, WindowSource};
use crate::types::{RawWindow, WindowHandle};

unsafe extern "system" fn collect(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = unsafe { &mut *(lparam as *mut Vec<HWND>) };
    handles.push(hwnd);
    TRUE
}

fn window_text(hwnd: HWND) -> String {
    let len = unsafe { GetWindowTextLengthW(hwnd) };
    if len <= 0 {
        return String::new();
    }
    let mut buf = vec![0u16; len as usize + 1];
    let copied = unsafe { GetWindowTextW(hwnd, buf.as_mut_ptr(), buf.len() as i32) };
    String::from_utf16_lossy(&buf[..copied.max(0) as usize])
}

fn class_name(hwnd: HWND) -> String {
    let mut buf = [0u16; windows::CLASS_NAME_CAPACITY];
    let copied = unsafe { GetClassNameW(hwnd, buf.as_mut_ptr(), buf.len() as i32) };
    String::from_utf16_lossy(&buf[..copied.max(0) as usize])
}

/// Process handle closed on drop
struct Process(HANDLE);

impl Process {
    fn open(pid: u32) -> Option<Self> {
        let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, FALSE, pid) };
        (!handle.is_null()).then_some(Self(handle))
    }

    fn image_path(&self) -> Option<String> {
        let mut buf = vec![0u16; windows::IMAGE_PATH_CAPACITY];
        let mut size = buf.len() as u32;
        let ok = unsafe { QueryFullProcessImageNameW(self.0, PROCESS_NAME_WIN32, buf.as_mut_ptr(), &mut size) };
        (ok != 0).then(|| String::from_utf16_lossy(&buf[..size as usize]))
    }

    fn is_running(&self) -> bool {
        let mut code = 0u32;
        unsafe { GetExitCodeProcess(self.0, &mut code) } != 0 && code == windows::STILL_ACTIVE
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.0) };
    }
}

/// Lowercase executable file name, empty when the process is inaccessible
fn process_name(pid: u32) -> String {
    Process::open(pid)
        .and_then(|process| process.image_path())
        .and_then(|path| {
            Path::new(&path)
                .file_name()
                .map(|name| name.to_string_lossy().to_lowercase())
        })
        .unwrap_or_default()
}

/// Top-level windows from `EnumWindows`
pub struct Win32Source;

impl Win32Source {
    fn describe(hwnd: HWND) -> Option<RawWindow> {
        // Invisible helper windows vastly outnumber real ones; skip them early
        let minimized = unsafe { IsIconic(hwnd) } != 0;
        let visible = unsafe { IsWindowVisible(hwnd) } != 0;
        if !visible && !minimized {
            return None;
        }
        let title = window_text(hwnd);
        if title.trim().is_empty() {
            return None;
        }

        let mut pid = 0u32;
        unsafe { GetWindowThreadProcessId(hwnd, &mut pid) };
        Some(RawWindow {
            handle: handle_of(hwnd),
            title,
            class_name: class_name(hwnd),
            pid,
            process_name: process_name(pid),
            visible: true,
            minimized,
        })
    }
}

impl WindowSource for Win32Source {
    fn enumerate(&self) -> Result<Vec<RawWindow>, PlatformError> {
        let mut handles: Vec<HWND> = Vec::new();
        let ok = unsafe { EnumWindows(Some(collect), &mut handles as *mut Vec<HWND> as LPARAM) };
        if ok == 0 {
            return Err(last_error("EnumWindows"));
        }
        trace!(count = handles.len(), "Enumerated top-level windows");
        Ok(handles.into_iter().filter_map(Self::describe).collect())
    }

    fn window_exists(&self, handle: WindowHandle) -> bool {
        unsafe { IsWindow(hwnd(handle)) } != 0
    }

    fn process_alive(&self, pid: u32) -> bool {
        Process::open(pid).is_some_and(|process| process.is_running())
    }
}
