//! Configuration for the cycler
//!
//! - **settings**: global tunables in settings.json
//! - **profile**: the persisted profile document format

pub mod profile;
pub mod settings;

pub use profile::{HotkeyDocument, HotkeyKind, Profile};
pub use settings::{NameMatching, Settings, config_dir, parse_level};
