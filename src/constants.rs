//! Application-wide constants
//!
//! This module contains the magic numbers and string literals used throughout
//! the cycler, providing a single source of truth for constant values.
//! Values that users are expected to tune (debounce, retention) live in
//! [`crate::config::Settings`] and only take their defaults from here.

/// Game client detection constants
pub mod games {
    /// Executable names of the native Dofus 2 / Unity clients
    pub const DOFUS_PROCESSES: &[&str] = &["dofus.exe", "dofus", "dofus.x64"];

    /// Executable names of the Wakfu client
    pub const WAKFU_PROCESSES: &[&str] = &["wakfu.exe", "wakfu"];

    /// Dofus Retro and Wakfu ship a bundled JVM
    pub const JAVA_PROCESSES: &[&str] = &["java.exe", "javaw.exe", "java"];

    /// Wine hosts the Windows clients on Linux
    pub const WINE_PROCESSES: &[&str] = &["wine64-preloader", "wine-preloader", "wine"];

    pub const DOFUS_KEYWORD: &str = "dofus";
    pub const WAKFU_KEYWORD: &str = "wakfu";
    pub const RETRO_KEYWORD: &str = "retro";
    pub const UNITY_KEYWORD: &str = "unity";

    /// Title segments containing one of these terms are not character names
    pub const NON_CHARACTER_TERMS: &[&str] = &[
        "dofus", "wakfu", "retro", "unity", "client", "launcher", "game", "ankama", "server",
        "beta", "alpha", "test", "release",
    ];

    /// Whole title segments that are never character names
    pub const COMMON_TITLE_WORDS: &[&str] = &[
        "version", "build", "client", "server", "beta", "alpha", "launcher", "game", "window",
        "main", "login",
    ];

    /// Title separators, applied in order
    pub const TITLE_SEPARATORS: &[&str] = &[" - ", " | ", " : ", "[", "]", "(", ")"];

    /// Window titles of launchers and updaters that share the game's process
    pub const LAUNCHER_TITLES: &[&str] = &["ankama launcher", "updater", "zaap"];

    /// Reported when no plausible name can be extracted from a title
    pub const UNKNOWN_CHARACTER: &str = "Unknown Character";

    /// Maximum length of the title fallback used as a character name
    pub const MAX_FALLBACK_NAME_LEN: usize = 30;

    /// Longest title segment still considered a plausible character name
    pub const MAX_CHARACTER_NAME_LEN: usize = 25;
}

/// Hotkey backend constants
pub mod hotkey {
    /// Default refractory window for trigger coalescing
    pub const DEFAULT_DEBOUNCE_MS: u64 = 150;

    /// Capacity of the trigger channel between listener threads and the engine
    pub const TRIGGER_CHANNEL_CAPACITY: usize = 64;

    /// Capacity of the capture channel shared by all strategies
    pub const CAPTURE_CHANNEL_CAPACITY: usize = 8;

    /// Default time a capture session waits for input
    pub const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 10;

    /// Interval at which polling strategies sample input state
    pub const POLL_INTERVAL_MS: u64 = 10;

    /// How often blocking listener loops check their stop flag
    pub const STOP_CHECK_INTERVAL_MS: u64 = 25;
}

/// Window activation constants
pub mod activation {
    /// Default delay before verifying that a ladder step took effect
    pub const DEFAULT_SETTLE_MS: u64 = 60;
}

/// Configuration file layout
pub mod config {
    /// Directory under the user's config dir
    pub const APP_DIR: &str = "dofus-cycler";

    /// Global settings file
    pub const SETTINGS_FILE: &str = "settings.json";

    /// Profile documents
    pub const PROFILES_DIR: &str = "profiles";

    /// Backup records
    pub const BACKUPS_DIR: &str = "backups";

    /// Extension of every persisted document
    pub const DOCUMENT_EXTENSION: &str = "json";

    /// Environment override for the configuration directory
    pub const CONFIG_DIR_ENV: &str = "DOFUS_CYCLER_CONFIG_DIR";

    /// Environment override for the log level
    pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

    /// Current profile document format
    pub const PROFILE_FORMAT_VERSION: u32 = 1;

    /// Default number of backups kept per profile name
    pub const DEFAULT_BACKUP_RETENTION: usize = 10;

    /// Default age after which backups of deleted profiles are purged
    pub const DEFAULT_BACKUP_GRACE_DAYS: u32 = 7;

    /// Default interval of the background registry refresh
    pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 5;

    /// Separates the encoded profile name from the timestamp in backup names
    pub const BACKUP_SEPARATOR: char = '@';

    /// Sortable timestamp used as the backup suffix
    pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";
}

/// Input event constants (from evdev)
pub mod input {
    /// Key press event value
    pub const KEY_PRESS: i32 = 1;

    /// Key release event value
    pub const KEY_RELEASE: i32 = 0;

    /// Key repeat event value
    pub const KEY_REPEAT: i32 = 2;
}

/// Filesystem paths used on Linux
pub mod paths {
    /// evdev device nodes
    pub const DEV_INPUT: &str = "/dev/input";

    /// Per-process information
    pub const PROC: &str = "/proc";
}

/// Permission hints shown when the hook strategy is blocked
pub mod permissions {
    /// Group owning /dev/input/event* on most distributions
    pub const INPUT_GROUP: &str = "input";

    /// Shell command that grants access
    pub const ADD_TO_INPUT_GROUP: &str = "sudo usermod -aG input $USER";
}

/// X11 protocol constants
pub mod x11 {
    /// Source indication for _NET_ACTIVE_WINDOW (2 = pager/direct user action)
    pub const ACTIVE_WINDOW_SOURCE_PAGER: u32 = 2;

    /// XTest fake input event types
    pub const FAKE_KEY_PRESS: u8 = 2;
    pub const FAKE_KEY_RELEASE: u8 = 3;
    pub const FAKE_BUTTON_PRESS: u8 = 4;
    pub const FAKE_BUTTON_RELEASE: u8 = 5;
    pub const FAKE_MOTION: u8 = 6;

    /// Left pointer button
    pub const BUTTON_LEFT: u8 = 1;

    /// Keysym of the left Alt key, the neutral modifier tapped by the ladder
    pub const KEYSYM_ALT_L: u32 = 0xffe9;

    /// Longest title read from WM_NAME / _NET_WM_NAME
    pub const MAX_TITLE_WORDS: u32 = 1024;
}

/// Win32 constants
pub mod windows {
    /// GetExitCodeProcess result for a running process
    pub const STILL_ACTIVE: u32 = 259;

    /// Window class names are at most 256 characters
    pub const CLASS_NAME_CAPACITY: usize = 256;

    /// Buffer for QueryFullProcessImageNameW
    pub const IMAGE_PATH_CAPACITY: usize = 1024;

    /// Identifier of the thread hotkey registered by the cycler
    pub const HOTKEY_ID: i32 = 0x0C1C;
}
