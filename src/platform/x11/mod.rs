//! X11 backend
//!
//! Windows come from the EWMH client list, activation goes through
//! `_NET_ACTIVE_WINDOW` with XTest for synthetic input, and hotkeys are
//! either grabbed on the root window or polled from the keymap.

mod focus;
mod grab;
mod poll;
mod source;

use std::sync::Arc;
use tracing::info;
use x11rb::connection::Connection;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

pub use focus::X11Focus;
pub use grab::GrabStrategy;
pub use poll::PollStrategy;
pub use source::X11Source;

use super::{NativePlatform, PlatformError, evdev::EvdevHook};
use crate::hotkey::Modifiers;
use crate::types::WindowHandle;

impl From<ConnectError> for PlatformError {
    fn from(e: ConnectError) -> Self {
        PlatformError::Connection(e.to_string())
    }
}

impl From<ConnectionError> for PlatformError {
    fn from(e: ConnectionError) -> Self {
        PlatformError::Protocol(e.to_string())
    }
}

impl From<ReplyError> for PlatformError {
    fn from(e: ReplyError) -> Self {
        PlatformError::Protocol(e.to_string())
    }
}

/// Pre-cached X11 atoms to avoid repeated roundtrips
pub struct CachedAtoms {
    pub net_client_list: Atom,
    pub net_wm_name: Atom,
    pub utf8_string: Atom,
    pub net_wm_pid: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_hidden: Atom,
    pub net_active_window: Atom,
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self, PlatformError> {
        let intern = |name: &[u8]| -> Result<Atom, PlatformError> { Ok(conn.intern_atom(false, name)?.reply()?.atom) };
        Ok(Self {
            net_client_list: intern(b"_NET_CLIENT_LIST")?,
            net_wm_name: intern(b"_NET_WM_NAME")?,
            utf8_string: intern(b"UTF8_STRING")?,
            net_wm_pid: intern(b"_NET_WM_PID")?,
            net_wm_state: intern(b"_NET_WM_STATE")?,
            net_wm_state_hidden: intern(b"_NET_WM_STATE_HIDDEN")?,
            net_active_window: intern(b"_NET_ACTIVE_WINDOW")?,
        })
    }
}

/// Connection shared by the window source and focus control
pub struct Session {
    pub conn: RustConnection,
    pub root: Window,
    pub atoms: CachedAtoms,
}

impl Session {
    pub fn connect() -> Result<Self, PlatformError> {
        let (conn, root) = connect_root()?;
        let atoms = CachedAtoms::new(&conn)?;
        Ok(Self { conn, root, atoms })
    }

    /// 32-bit property values, empty when the property is unset
    pub fn property32(&self, window: Window, property: Atom, type_: impl Into<Atom>) -> Result<Vec<u32>, PlatformError> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, u32::MAX)?
            .reply()?;
        Ok(reply.value32().map(Iterator::collect).unwrap_or_default())
    }

    pub fn is_hidden(&self, window: Window) -> Result<bool, PlatformError> {
        let states = self.property32(window, self.atoms.net_wm_state, AtomEnum::ATOM)?;
        Ok(states.contains(&self.atoms.net_wm_state_hidden))
    }
}

/// Open a connection and return it with the default screen's root window
pub(crate) fn connect_root() -> Result<(RustConnection, Window), PlatformError> {
    let (conn, screen_num) = x11rb::connect(None)?;
    let root = conn
        .setup()
        .roots
        .get(screen_num)
        .map(|screen| screen.root)
        .ok_or_else(|| PlatformError::Connection(format!("screen {screen_num} does not exist")))?;
    Ok((conn, root))
}

pub(crate) fn window_of(handle: WindowHandle) -> Result<Window, PlatformError> {
    Window::try_from(handle.0).map_err(|_| PlatformError::NoSuchWindow(handle))
}

/// Keysym table of the server's keyboard mapping
pub struct Keymap {
    min_keycode: Keycode,
    per_keycode: usize,
    keysyms: Vec<Keysym>,
}

impl Keymap {
    pub fn load(conn: &RustConnection) -> Result<Self, PlatformError> {
        let setup = conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let reply = conn.get_keyboard_mapping(min, max - min + 1)?.reply()?;
        Ok(Self {
            min_keycode: min,
            per_keycode: usize::from(reply.keysyms_per_keycode),
            keysyms: reply.keysyms,
        })
    }

    /// First keycode producing `keysym` in any column
    pub fn keycode(&self, keysym: Keysym) -> Option<Keycode> {
        if self.per_keycode == 0 {
            return None;
        }
        let index = self.keysyms.iter().position(|&sym| sym == keysym)?;
        let offset = Keycode::try_from(index / self.per_keycode).ok()?;
        self.min_keycode.checked_add(offset)
    }

    /// Unshifted keysym of `keycode`
    pub fn keysym(&self, keycode: Keycode) -> Option<Keysym> {
        let row = usize::from(keycode.checked_sub(self.min_keycode)?);
        self.keysyms
            .get(row * self.per_keycode)
            .copied()
            .filter(|&sym| sym != 0)
    }
}

pub(crate) fn modifier_mask(modifiers: Modifiers) -> u16 {
    let mut mask = 0;
    if modifiers.ctrl {
        mask |= u16::from(ModMask::CONTROL);
    }
    if modifiers.alt {
        mask |= u16::from(ModMask::M1);
    }
    if modifiers.shift {
        mask |= u16::from(ModMask::SHIFT);
    }
    mask
}

/// Ctrl/Alt/Shift held according to an event or pointer state mask
pub(crate) fn modifiers_from_state(state: u16) -> Modifiers {
    Modifiers {
        ctrl: state & u16::from(KeyButMask::CONTROL) != 0,
        alt: state & u16::from(KeyButMask::MOD1) != 0,
        shift: state & u16::from(KeyButMask::SHIFT) != 0,
    }
}

pub fn native() -> Result<NativePlatform, PlatformError> {
    let session = Arc::new(Session::connect()?);
    info!(root = session.root, "Connected to X11 server");

    let focus = X11Focus::new(session.clone())?;
    if !super::evdev::check_permissions() {
        super::evdev::log_permission_help();
    }
    Ok(NativePlatform {
        source: Arc::new(X11Source::new(session)),
        focus: Arc::new(focus),
        strategies: vec![
            Box::new(EvdevHook::new()),
            Box::new(GrabStrategy::new()),
            Box::new(PollStrategy::new()),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keymap() -> Keymap {
        // Two columns per keycode, starting at keycode 8
        Keymap {
            min_keycode: 8,
            per_keycode: 2,
            keysyms: vec![0, 0, 0x61, 0x41, 0xffe9, 0xffe7, 0xffbe, 0],
        }
    }

    #[test]
    fn test_keymap_lookups() {
        let map = keymap();
        assert_eq!(map.keycode(0x61), Some(9));
        assert_eq!(map.keycode(0x41), Some(9));
        assert_eq!(map.keycode(0xffe9), Some(10));
        assert_eq!(map.keycode(0x7a), None);

        assert_eq!(map.keysym(9), Some(0x61));
        assert_eq!(map.keysym(11), Some(0xffbe));
        assert_eq!(map.keysym(8), None);
        assert_eq!(map.keysym(7), None);
        assert_eq!(map.keysym(200), None);
    }

    #[test]
    fn test_modifier_masks_agree() {
        let modifiers = Modifiers {
            ctrl: true,
            alt: false,
            shift: true,
        };
        let mask = modifier_mask(modifiers);
        assert_eq!(modifiers_from_state(mask), modifiers);
        assert_eq!(modifiers_from_state(mask | u16::from(KeyButMask::LOCK)), modifiers);
        assert_eq!(modifiers_from_state(0), Modifiers::NONE);
    }
}
