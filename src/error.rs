//! Error taxonomy of the cycler core
//!
//! Every variant is recoverable: callers report it through the event channel
//! or a return value, nothing here terminates the process.

use std::path::PathBuf;
use thiserror::Error;

use crate::hotkey::HotkeyCombo;

#[derive(Error, Debug)]
pub enum CyclerError {
    #[error("window enumeration failed: {0}")]
    WindowEnumeration(String),

    #[error("no hotkey strategy could register {combo} ({})", attempts.join("; "))]
    HotkeyUnavailable {
        combo: HotkeyCombo,
        attempts: Vec<String>,
    },

    #[error("hotkey capture is unavailable on every strategy")]
    CaptureUnavailable,

    #[error("failed to release hotkey: {0}")]
    Disarm(#[from] crate::hotkey::StrategyError),

    #[error("hotkey backend is busy: {0}")]
    Busy(String),

    #[error("invalid hotkey '{0}'")]
    InvalidHotkey(String),

    #[error("profile '{name}' is corrupt: {reason}")]
    ProfileCorrupt { name: String, reason: String },

    #[error("profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("profile '{0}' already exists")]
    ProfileExists(String),

    #[error("invalid profile name '{0}'")]
    InvalidProfileName(String),

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("no backup available for profile '{0}'")]
    NoBackup(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("platform error: {0}")]
    Platform(#[from] crate::platform::PlatformError),
}

impl CyclerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CyclerError>;
