use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use x11rb::protocol::xproto::*;

use super::{Session, window_of};
use crate::constants::{paths, x11};
use crate::platform::{PlatformError, WindowSource};
use crate::types::{RawWindow, WindowHandle};

/// Windows listed in `_NET_CLIENT_LIST` by the window manager
pub struct X11Source {
    session: Arc<Session>,
}

impl X11Source {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn title(&self, window: Window) -> Result<String, PlatformError> {
        let s = &self.session;
        let utf8 = s
            .conn
            .get_property(false, window, s.atoms.net_wm_name, s.atoms.utf8_string, 0, x11::MAX_TITLE_WORDS)?
            .reply()?;
        if !utf8.value.is_empty() {
            return Ok(String::from_utf8_lossy(&utf8.value).into_owned());
        }
        let legacy = s
            .conn
            .get_property(false, window, AtomEnum::WM_NAME, AtomEnum::ANY, 0, x11::MAX_TITLE_WORDS)?
            .reply()?;
        Ok(String::from_utf8_lossy(&legacy.value).into_owned())
    }

    fn class_name(&self, window: Window) -> Result<String, PlatformError> {
        let reply = self
            .session
            .conn
            .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, x11::MAX_TITLE_WORDS)?
            .reply()?;
        Ok(parse_wm_class(&reply.value))
    }

    fn describe(&self, window: Window) -> Result<RawWindow, PlatformError> {
        let s = &self.session;
        let attributes = s.conn.get_window_attributes(window)?.reply()?;
        let minimized = s.is_hidden(window)?;
        let pid = s
            .property32(window, s.atoms.net_wm_pid, AtomEnum::CARDINAL)?
            .first()
            .copied()
            .unwrap_or(0);

        Ok(RawWindow {
            handle: WindowHandle(u64::from(window)),
            title: self.title(window)?,
            class_name: self.class_name(window)?,
            pid,
            process_name: process_name(pid),
            // Minimized clients are usually unmapped but still belong in the list
            visible: attributes.map_state == MapState::VIEWABLE || minimized,
            minimized,
        })
    }
}

impl WindowSource for X11Source {
    fn enumerate(&self) -> Result<Vec<RawWindow>, PlatformError> {
        let s = &self.session;
        let clients = s.property32(s.root, s.atoms.net_client_list, AtomEnum::WINDOW)?;
        if clients.is_empty() {
            return Err(PlatformError::Unsupported(
                "_NET_CLIENT_LIST is empty, is an EWMH window manager running?".to_string(),
            ));
        }

        let mut windows = Vec::with_capacity(clients.len());
        for window in clients {
            match self.describe(window) {
                Ok(raw) => windows.push(raw),
                // Windows can disappear between listing and querying
                Err(e) => debug!(window = window, error = %e, "Skipping window"),
            }
        }
        Ok(windows)
    }

    fn window_exists(&self, handle: WindowHandle) -> bool {
        let Ok(window) = window_of(handle) else {
            return false;
        };
        self.session
            .conn
            .get_window_attributes(window)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .is_some()
    }

    fn process_alive(&self, pid: u32) -> bool {
        pid != 0 && Path::new(paths::PROC).join(pid.to_string()).exists()
    }
}

/// Class part of a `WM_CLASS` value ("instance\0class\0"), else the instance
fn parse_wm_class(value: &[u8]) -> String {
    let mut parts = value
        .split(|&b| b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned());
    let instance = parts.next().unwrap_or_default();
    parts.next().unwrap_or(instance)
}

/// Lowercase executable name from /proc, empty when unknown
fn process_name(pid: u32) -> String {
    if pid == 0 {
        return String::new();
    }
    let comm = Path::new(paths::PROC).join(pid.to_string()).join("comm");
    fs::read_to_string(comm)
        .map(|name| name.trim().to_lowercase())
        .unwrap_or_default()
}
