//! Core domain types shared across modules

use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry-issued identity of one tracked window instance.
///
/// Ids are never reused: a window that disappears and reappears (even with
/// the same OS handle and title) is a new instance with a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque OS window handle (X11 window id or HWND value)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Supported game clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameVariant {
    #[serde(rename = "dofus")]
    DofusClassic,
    #[serde(rename = "dofus-retro")]
    DofusRetro,
    #[serde(rename = "dofus-unity")]
    DofusUnity,
    #[serde(rename = "wakfu")]
    Wakfu,
}

impl GameVariant {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::DofusClassic => "dofus",
            Self::DofusRetro => "dofus-retro",
            Self::DofusUnity => "dofus-unity",
            Self::Wakfu => "wakfu",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "dofus" | "dofus-classic" => Some(Self::DofusClassic),
            "dofus-retro" | "retro" => Some(Self::DofusRetro),
            "dofus-unity" | "unity" => Some(Self::DofusUnity),
            "wakfu" => Some(Self::Wakfu),
            _ => None,
        }
    }
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DofusClassic => "Dofus",
            Self::DofusRetro => "Dofus Retro",
            Self::DofusUnity => "Dofus Unity",
            Self::Wakfu => "Wakfu",
        };
        f.write_str(label)
    }
}

/// Owning process of a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// Top-level window as reported by a [`crate::platform::WindowSource`],
/// before any game matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWindow {
    pub handle: WindowHandle,
    pub title: String,
    pub class_name: String,
    /// 0 when the owning process could not be determined
    pub pid: u32,
    /// Lowercase executable name, empty when unknown
    pub process_name: String,
    pub visible: bool,
    pub minimized: bool,
}

/// A tracked game client window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameWindow {
    pub id: WindowId,
    pub handle: WindowHandle,
    pub title: String,
    pub character_name: String,
    pub variant: GameVariant,
    pub process: ProcessInfo,
    pub minimized: bool,
    pub valid: bool,
}

impl GameWindow {
    pub fn descriptor(&self, order: usize) -> WindowDescriptor {
        WindowDescriptor {
            character_name: self.character_name.clone(),
            game_variant: self.variant,
            order,
        }
    }
}

impl fmt::Display for GameWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.character_name, self.variant)
    }
}

/// Persistable window identity: handles are not stable across sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowDescriptor {
    pub character_name: String,
    pub game_variant: GameVariant,
    pub order: usize,
}
