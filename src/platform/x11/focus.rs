use std::sync::Arc;
use tracing::warn;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::protocol::xtest::ConnectionExt as _;

use super::{Keymap, Session, window_of};
use crate::constants::x11;
use crate::platform::{FocusControl, PlatformError};
use crate::types::WindowHandle;

/// EWMH activation with XTest for synthetic input
pub struct X11Focus {
    session: Arc<Session>,
    alt_keycode: Option<Keycode>,
}

impl X11Focus {
    pub fn new(session: Arc<Session>) -> Result<Self, PlatformError> {
        let alt_keycode = Keymap::load(&session.conn)?.keycode(x11::KEYSYM_ALT_L);
        if alt_keycode.is_none() {
            warn!("No keycode for Alt_L, the modifier bypass step is unavailable");
        }
        Ok(Self { session, alt_keycode })
    }

    fn fake_input(&self, type_: u8, detail: u8, x: i16, y: i16) -> Result<(), PlatformError> {
        self.session
            .conn
            .xtest_fake_input(type_, detail, x11rb::CURRENT_TIME, self.session.root, x, y, 0)?;
        Ok(())
    }
}

impl FocusControl for X11Focus {
    fn is_minimized(&self, handle: WindowHandle) -> Result<bool, PlatformError> {
        self.session.is_hidden(window_of(handle)?)
    }

    fn restore(&self, handle: WindowHandle) -> Result<(), PlatformError> {
        let conn = &self.session.conn;
        conn.map_window(window_of(handle)?)?;
        conn.flush()?;
        Ok(())
    }

    /// Raise, then ask the window manager through `_NET_ACTIVE_WINDOW`
    fn request_foreground(&self, handle: WindowHandle) -> Result<(), PlatformError> {
        let window = window_of(handle)?;
        let s = &self.session;

        s.conn
            .configure_window(window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))?;

        let event = ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window,
            type_: s.atoms.net_active_window,
            data: ClientMessageData::from([
                x11::ACTIVE_WINDOW_SOURCE_PAGER,
                x11rb::CURRENT_TIME,
                0,
                0,
                0,
            ]),
        };
        s.conn.send_event(
            false,
            s.root,
            EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
            &event,
        )?;
        s.conn.flush()?;
        Ok(())
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        let s = &self.session;
        s.property32(s.root, s.atoms.net_active_window, AtomEnum::WINDOW)
            .ok()?
            .first()
            .copied()
            .filter(|&window| window != x11rb::NONE)
            .map(|window| WindowHandle(u64::from(window)))
    }

    /// X11 has no per-thread input queues; the nearest equivalent is
    /// assigning keyboard focus directly, which needs no undoing.
    fn attach_input(&self, handle: WindowHandle) -> Result<bool, PlatformError> {
        let conn = &self.session.conn;
        conn.set_input_focus(InputFocus::PARENT, window_of(handle)?, x11rb::CURRENT_TIME)?;
        conn.flush()?;
        Ok(false)
    }

    fn detach_input(&self, _handle: WindowHandle) {}

    fn set_neutral_modifier(&self, down: bool) -> Result<(), PlatformError> {
        let keycode = self
            .alt_keycode
            .ok_or_else(|| PlatformError::Unsupported("no keycode for Alt_L".to_string()))?;
        let type_ = if down {
            x11::FAKE_KEY_PRESS
        } else {
            x11::FAKE_KEY_RELEASE
        };
        self.fake_input(type_, keycode, 0, 0)?;
        self.session.conn.flush()?;
        Ok(())
    }

    fn window_center(&self, handle: WindowHandle) -> Result<(i32, i32), PlatformError> {
        let s = &self.session;
        let window = window_of(handle)?;
        let geometry = s.conn.get_geometry(window)?.reply()?;
        let origin = s.conn.translate_coordinates(window, s.root, 0, 0)?.reply()?;
        Ok((
            i32::from(origin.dst_x) + i32::from(geometry.width) / 2,
            i32::from(origin.dst_y) + i32::from(geometry.height) / 2,
        ))
    }

    fn click_at(&self, x: i32, y: i32) -> Result<(), PlatformError> {
        let clamp = |v: i32| v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        self.fake_input(x11::FAKE_MOTION, 0, clamp(x), clamp(y))?;
        self.fake_input(x11::FAKE_BUTTON_PRESS, x11::BUTTON_LEFT, 0, 0)?;
        self.fake_input(x11::FAKE_BUTTON_RELEASE, x11::BUTTON_LEFT, 0, 0)?;
        self.session.conn.flush()?;
        Ok(())
    }
}
