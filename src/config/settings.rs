//! Global settings (settings.json)
//!
//! Every field has a serde default so older or hand-edited files keep
//! loading; out-of-range values are clamped with a warning after parsing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, info, warn};

use crate::constants::{activation, config, hotkey};

/// How character names are compared when a profile is resolved against the
/// live windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameMatching {
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    /// Ignore a trailing `(Server)` or `[Server]` group
    #[serde(default)]
    pub strip_server_suffix: bool,
}

impl Default for NameMatching {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            strip_server_suffix: false,
        }
    }
}

impl NameMatching {
    pub fn normalize(&self, name: &str) -> String {
        let mut name = name.trim();
        if self.strip_server_suffix {
            for (open, close) in [('(', ')'), ('[', ']')] {
                if name.ends_with(close)
                    && let Some(start) = name.rfind(open)
                {
                    name = name[..start].trim_end();
                    break;
                }
            }
        }
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    pub fn same_character(&self, a: &str, b: &str) -> bool {
        self.normalize(a) == self.normalize(b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_backup_retention")]
    pub backup_retention: usize,
    #[serde(default = "default_backup_grace_days")]
    pub backup_grace_days: u32,
    #[serde(default = "default_capture_timeout_secs")]
    pub capture_timeout_secs: u64,
    #[serde(default = "default_activation_settle_ms")]
    pub activation_settle_ms: u64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub name_matching: NameMatching,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_profile: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_debounce_ms() -> u64 {
    hotkey::DEFAULT_DEBOUNCE_MS
}

fn default_backup_retention() -> usize {
    config::DEFAULT_BACKUP_RETENTION
}

fn default_backup_grace_days() -> u32 {
    config::DEFAULT_BACKUP_GRACE_DAYS
}

fn default_capture_timeout_secs() -> u64 {
    hotkey::DEFAULT_CAPTURE_TIMEOUT_SECS
}

fn default_activation_settle_ms() -> u64 {
    activation::DEFAULT_SETTLE_MS
}

fn default_refresh_interval_secs() -> u64 {
    config::DEFAULT_REFRESH_INTERVAL_SECS
}

const MAX_DEBOUNCE_MS: u64 = 2_000;
const MAX_BACKUP_RETENTION: usize = 100;
const MAX_CAPTURE_TIMEOUT_SECS: u64 = 120;
const MAX_SETTLE_MS: u64 = 1_000;
const MAX_REFRESH_INTERVAL_SECS: u64 = 300;

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            debounce_ms: default_debounce_ms(),
            backup_retention: default_backup_retention(),
            backup_grace_days: default_backup_grace_days(),
            capture_timeout_secs: default_capture_timeout_secs(),
            activation_settle_ms: default_activation_settle_ms(),
            refresh_interval_secs: default_refresh_interval_secs(),
            name_matching: NameMatching::default(),
            last_profile: None,
        }
    }
}

/// Parse a level name, falling back to INFO
pub fn parse_level(name: &str) -> Level {
    match name.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Root configuration directory, honouring the environment override
pub fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(config::CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(config::APP_DIR);
    path
}

impl Settings {
    pub fn path() -> PathBuf {
        config_dir().join(config::SETTINGS_FILE)
    }

    /// Level named in the settings file at `path`, read without logging so
    /// it can pick the subscriber level before [`Settings::load`] runs
    pub fn logged_level(path: &Path) -> Option<String> {
        #[derive(Deserialize)]
        struct LevelOnly {
            log_level: Option<String>,
        }

        let contents = fs::read_to_string(path).ok()?;
        serde_json::from_str::<LevelOnly>(&contents).ok()?.log_level
    }

    /// Load from the default location, writing defaults on first run
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Settings file not found, creating defaults");
            let settings = Settings::default();
            settings.save_to(path)?;
            return Ok(settings);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let mut settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))?;
        settings.validate_and_clamp();
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json).with_context(|| format!("Failed to write settings to {}", path.display()))?;
        info!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Clamp values to safe ranges
    pub fn validate_and_clamp(&mut self) {
        let level = self.log_level.trim().to_lowercase();
        if !["trace", "debug", "info", "warn", "warning", "error"].contains(&level.as_str()) {
            warn!(log_level = %self.log_level, "Unknown log_level, using info");
            self.log_level = default_log_level();
        }
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            warn!(debounce_ms = self.debounce_ms, max = MAX_DEBOUNCE_MS, "debounce_ms exceeds maximum, clamping");
            self.debounce_ms = MAX_DEBOUNCE_MS;
        }
        if self.backup_retention == 0 {
            warn!(using = 1, "backup_retention of 0 would discard every backup, using 1");
            self.backup_retention = 1;
        } else if self.backup_retention > MAX_BACKUP_RETENTION {
            warn!(backup_retention = self.backup_retention, max = MAX_BACKUP_RETENTION, "backup_retention exceeds maximum, clamping");
            self.backup_retention = MAX_BACKUP_RETENTION;
        }
        if self.capture_timeout_secs == 0 {
            warn!(using = default_capture_timeout_secs(), "capture_timeout_secs is 0, using default");
            self.capture_timeout_secs = default_capture_timeout_secs();
        } else if self.capture_timeout_secs > MAX_CAPTURE_TIMEOUT_SECS {
            warn!(capture_timeout_secs = self.capture_timeout_secs, max = MAX_CAPTURE_TIMEOUT_SECS, "capture_timeout_secs exceeds maximum, clamping");
            self.capture_timeout_secs = MAX_CAPTURE_TIMEOUT_SECS;
        }
        if self.activation_settle_ms > MAX_SETTLE_MS {
            warn!(activation_settle_ms = self.activation_settle_ms, max = MAX_SETTLE_MS, "activation_settle_ms exceeds maximum, clamping");
            self.activation_settle_ms = MAX_SETTLE_MS;
        }
        if self.refresh_interval_secs == 0 {
            warn!(using = 1, "refresh_interval_secs is 0, using 1");
            self.refresh_interval_secs = 1;
        } else if self.refresh_interval_secs > MAX_REFRESH_INTERVAL_SECS {
            warn!(refresh_interval_secs = self.refresh_interval_secs, max = MAX_REFRESH_INTERVAL_SECS, "refresh_interval_secs exceeds maximum, clamping");
            self.refresh_interval_secs = MAX_REFRESH_INTERVAL_SECS;
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn activation_settle(&self) -> Duration {
        Duration::from_millis(self.activation_settle_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn backup_grace(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.backup_grace_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "debounce_ms": 200 }"#).unwrap();
        assert_eq!(settings.debounce_ms, 200);
        assert_eq!(settings.backup_retention, 10);
        assert_eq!(settings.refresh_interval_secs, 5);
        assert!(settings.name_matching.case_sensitive);
        assert_eq!(settings.last_profile, None);
    }

    #[test]
    fn test_validate_and_clamp() {
        let mut settings = Settings {
            log_level: "verbose".to_string(),
            debounce_ms: 60_000,
            backup_retention: 0,
            capture_timeout_secs: 0,
            refresh_interval_secs: 10_000,
            ..Settings::default()
        };
        settings.validate_and_clamp();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.debounce_ms, MAX_DEBOUNCE_MS);
        assert_eq!(settings.backup_retention, 1);
        assert_eq!(settings.capture_timeout_secs, hotkey::DEFAULT_CAPTURE_TIMEOUT_SECS);
        assert_eq!(settings.refresh_interval_secs, MAX_REFRESH_INTERVAL_SECS);
    }

    #[test]
    fn test_load_creates_defaults_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(config::SETTINGS_FILE);

        let created = Settings::load_from(&path).unwrap();
        assert_eq!(created, Settings::default());
        assert!(path.exists());

        let mut changed = created.clone();
        changed.last_profile = Some("raid".to_string());
        changed.name_matching.case_sensitive = false;
        changed.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), changed);
    }

    #[test]
    fn test_logged_level_reads_without_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(config::SETTINGS_FILE);
        assert_eq!(Settings::logged_level(&path), None);

        fs::write(&path, r#"{ "log_level": "debug", "debounce_ms": 60000 }"#).unwrap();
        assert_eq!(Settings::logged_level(&path).as_deref(), Some("debug"));

        fs::write(&path, r#"{ "debounce_ms": 10 }"#).unwrap();
        assert_eq!(Settings::logged_level(&path), None);
    }

    #[test]
    fn test_corrupt_settings_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(config::SETTINGS_FILE);
        fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }

    #[test]
    fn test_name_matching_policies() {
        let exact = NameMatching::default();
        assert!(exact.same_character("Iop-Bob", " Iop-Bob "));
        assert!(!exact.same_character("Iop-Bob", "iop-bob"));
        assert!(!exact.same_character("Iop-Bob", "Iop-Bob (Draconiros)"));

        let relaxed = NameMatching {
            case_sensitive: false,
            strip_server_suffix: true,
        };
        assert!(relaxed.same_character("Iop-Bob", "iop-bob"));
        assert!(relaxed.same_character("Iop-Bob [Imagiro]", "Iop-Bob (Draconiros)"));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("nonsense"), Level::INFO);
    }
}
