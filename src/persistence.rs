//! Profile storage with backup rotation
//!
//! Layout under the store root:
//!
//! ```text
//! profiles/<name>.json
//! backups/<name>@<timestamp>.json
//! ```
//!
//! Names are percent-encoded so any profile name maps to a safe file name.
//! Documents are written to a temporary file and renamed into place.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{NameMatching, Profile, Settings};
use crate::constants::config;
use crate::error::{CyclerError, Result};
use crate::hotkey::HotkeyCombo;
use crate::registry::WindowRegistry;
use crate::types::{GameWindow, WindowDescriptor, WindowId};

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupStatus {
    /// No previous document existed
    NotNeeded,
    Written(PathBuf),
    /// The backup could not be written; the primary write still went ahead
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub path: PathBuf,
    pub backup: BackupStatus,
    /// Backups deleted by retention
    pub pruned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub name: String,
    pub path: PathBuf,
    pub taken_at: DateTime<Utc>,
}

/// A profile resolved against the live windows
#[derive(Debug, Clone)]
pub struct LoadedProfile {
    pub profile: Profile,
    pub hotkey: HotkeyCombo,
    /// Matched windows, in profile order
    pub selection: Vec<WindowId>,
    /// Descriptors with no live counterpart, in profile order
    pub unmatched: Vec<WindowDescriptor>,
}

pub struct ProfileStore {
    root: PathBuf,
    retention: usize,
    grace: chrono::Duration,
    matching: NameMatching,
}

fn encode_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' || byte == b' ' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn decode_name(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed != name || name.chars().count() > MAX_NAME_LEN || name.chars().any(char::is_control) {
        return Err(CyclerError::InvalidProfileName(name.to_string()));
    }
    Ok(())
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).map_err(|e| CyclerError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| CyclerError::io(path, e))
}

fn parse_document(name: &str, contents: &str) -> Result<Profile> {
    let profile: Profile = serde_json::from_str(contents).map_err(|e| CyclerError::ProfileCorrupt {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    profile.validate().map_err(|e| CyclerError::ProfileCorrupt {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(profile)
}

impl ProfileStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            root: root.into(),
            retention: config::DEFAULT_BACKUP_RETENTION,
            grace: chrono::Duration::days(i64::from(config::DEFAULT_BACKUP_GRACE_DAYS)),
            matching: NameMatching::default(),
        };
        for dir in [store.profiles_dir(), store.backups_dir()] {
            fs::create_dir_all(&dir).map_err(|e| CyclerError::io(&dir, e))?;
        }
        Ok(store)
    }

    /// Open the store in the configuration directory with `settings` applied
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::open(crate::config::config_dir())?
            .with_retention(settings.backup_retention)
            .with_backup_grace(settings.backup_grace())
            .with_name_matching(settings.name_matching))
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    pub fn with_backup_grace(mut self, grace: chrono::Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_name_matching(mut self, matching: NameMatching) -> Self {
        self.matching = matching;
        self
    }

    pub fn name_matching(&self) -> NameMatching {
        self.matching
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn profiles_dir(&self) -> PathBuf {
        self.root.join(config::PROFILES_DIR)
    }

    fn backups_dir(&self) -> PathBuf {
        self.root.join(config::BACKUPS_DIR)
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir()
            .join(format!("{}.{}", encode_name(name), config::DOCUMENT_EXTENSION))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.profile_path(name).is_file()
    }

    /// Read and validate a stored profile without resolving it
    pub fn read(&self, name: &str) -> Result<Profile> {
        validate_name(name)?;
        let path = self.profile_path(name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CyclerError::ProfileNotFound(name.to_string()));
            }
            Err(e) => return Err(CyclerError::io(&path, e)),
        };
        parse_document(name, &contents)
    }

    /// Persist `selection` (in order) and `hotkey` under `name`.
    ///
    /// Creation time and description of an existing document are kept.
    pub fn save(&self, name: &str, selection: &[GameWindow], hotkey: HotkeyCombo) -> Result<SaveOutcome> {
        validate_name(name)?;
        let windows = selection
            .iter()
            .enumerate()
            .map(|(order, window)| window.descriptor(order))
            .collect();
        let mut profile = Profile::new(name, windows, hotkey);
        if let Ok(existing) = self.read(name) {
            profile.created_at = existing.created_at;
            profile.description = existing.description;
        }
        self.save_profile(&profile)
    }

    /// Write a complete document, backing up the one it replaces
    pub fn save_profile(&self, profile: &Profile) -> Result<SaveOutcome> {
        validate_name(&profile.name)?;
        profile.validate()?;
        let path = self.profile_path(&profile.name);

        let backup = if path.is_file() {
            match self.write_backup(&profile.name, &path) {
                Ok(backup_path) => BackupStatus::Written(backup_path),
                Err(e) => {
                    warn!(profile = %profile.name, error = %e, "Failed to back up profile, saving anyway");
                    BackupStatus::Failed(e.to_string())
                }
            }
        } else {
            BackupStatus::NotNeeded
        };

        let json = serde_json::to_string_pretty(profile)?;
        write_atomic(&path, &json)?;
        info!(profile = %profile.name, windows = profile.windows.len(), path = %path.display(), "Saved profile");

        let pruned = match self.prune_backups(&profile.name) {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!(profile = %profile.name, error = %e, "Failed to prune old backups");
                0
            }
        };
        Ok(SaveOutcome { path, backup, pruned })
    }

    fn write_backup(&self, name: &str, source: &Path) -> Result<PathBuf> {
        let dir = self.backups_dir();
        fs::create_dir_all(&dir).map_err(|e| CyclerError::io(&dir, e))?;
        let mut taken_at = Utc::now();
        let target = loop {
            let candidate = dir.join(format!(
                "{}{}{}.{}",
                encode_name(name),
                config::BACKUP_SEPARATOR,
                taken_at.format(config::BACKUP_TIMESTAMP_FORMAT),
                config::DOCUMENT_EXTENSION
            ));
            if !candidate.exists() {
                break candidate;
            }
            taken_at += chrono::Duration::microseconds(1);
        };
        fs::copy(source, &target).map_err(|e| CyclerError::io(&target, e))?;
        debug!(profile = %name, backup = %target.display(), "Wrote backup");
        Ok(target)
    }

    fn parse_backup_path(path: &Path) -> Option<BackupRecord> {
        if path.extension()? != config::DOCUMENT_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let (encoded, stamp) = stem.rsplit_once(config::BACKUP_SEPARATOR)?;
        let taken_at = NaiveDateTime::parse_from_str(stamp, config::BACKUP_TIMESTAMP_FORMAT)
            .ok()?
            .and_utc();
        Some(BackupRecord {
            name: decode_name(encoded)?,
            path: path.to_path_buf(),
            taken_at,
        })
    }

    fn all_backups(&self) -> Result<Vec<BackupRecord>> {
        let dir = self.backups_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CyclerError::io(&dir, e)),
        };
        let mut records: Vec<BackupRecord> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| Self::parse_backup_path(&entry.path()))
            .collect();
        records.sort_by_key(|r| r.taken_at);
        Ok(records)
    }

    /// Backups of `name`, oldest first
    pub fn backups(&self, name: &str) -> Result<Vec<BackupRecord>> {
        Ok(self.all_backups()?.into_iter().filter(|r| r.name == name).collect())
    }

    fn prune_backups(&self, name: &str) -> Result<usize> {
        let records = self.backups(name)?;
        let excess = records.len().saturating_sub(self.retention);
        for record in &records[..excess] {
            fs::remove_file(&record.path).map_err(|e| CyclerError::io(&record.path, e))?;
            debug!(profile = %name, backup = %record.path.display(), "Pruned backup");
        }
        Ok(excess)
    }

    /// Delete backups of profiles that no longer exist once they are older
    /// than the grace period
    pub fn purge_expired_backups(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.grace;
        let mut purged = 0;
        for record in self.all_backups()? {
            if record.taken_at < cutoff && !self.exists(&record.name) {
                fs::remove_file(&record.path).map_err(|e| CyclerError::io(&record.path, e))?;
                purged += 1;
            }
        }
        if purged > 0 {
            info!(purged = purged, "Purged expired backups of deleted profiles");
        }
        Ok(purged)
    }

    /// Load `name` and resolve its descriptors against the live windows.
    ///
    /// Each live window is claimed by at most one descriptor. Descriptors
    /// without a match are returned separately rather than failing the load.
    pub fn load(&self, name: &str, registry: &WindowRegistry) -> Result<LoadedProfile> {
        let profile = self.read(name)?;
        let hotkey = profile.combo()?;
        let snapshot = registry.snapshot();

        let mut claimed = HashSet::new();
        let mut selection = Vec::new();
        let mut unmatched = Vec::new();
        for descriptor in profile.ordered_windows() {
            let found = snapshot.windows().iter().find(|w| {
                w.valid
                    && !claimed.contains(&w.id)
                    && w.variant == descriptor.game_variant
                    && self.matching.same_character(&w.character_name, &descriptor.character_name)
            });
            match found {
                Some(window) => {
                    claimed.insert(window.id);
                    selection.push(window.id);
                }
                None => unmatched.push(descriptor.clone()),
            }
        }

        info!(
            profile = %name,
            matched = selection.len(),
            unmatched = unmatched.len(),
            "Loaded profile"
        );
        Ok(LoadedProfile {
            profile,
            hotkey,
            selection,
            unmatched,
        })
    }

    /// Stored profile names, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let dir = self.profiles_dir();
        let entries = fs::read_dir(&dir).map_err(|e| CyclerError::io(&dir, e))?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == config::DOCUMENT_EXTENSION))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).and_then(decode_name))
            .collect();
        names.sort();
        Ok(names)
    }

    fn ensure_free(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        if self.exists(name) {
            return Err(CyclerError::ProfileExists(name.to_string()));
        }
        Ok(())
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut profile = self.read(from)?;
        self.ensure_free(to)?;
        profile.name = to.to_string();
        profile.modified_at = Utc::now();
        self.save_profile(&profile)?;
        let old = self.profile_path(from);
        fs::remove_file(&old).map_err(|e| CyclerError::io(&old, e))?;
        info!(from = %from, to = %to, "Renamed profile");
        Ok(())
    }

    pub fn duplicate(&self, from: &str, to: &str) -> Result<()> {
        let mut profile = self.read(from)?;
        self.ensure_free(to)?;
        let now = Utc::now();
        profile.name = to.to_string();
        profile.created_at = now;
        profile.modified_at = now;
        self.save_profile(&profile)?;
        info!(from = %from, to = %to, "Duplicated profile");
        Ok(())
    }

    /// Remove the document. A final backup is written first and backups are
    /// kept until the grace period expires.
    pub fn delete(&self, name: &str) -> Result<BackupStatus> {
        validate_name(name)?;
        let path = self.profile_path(name);
        if !path.is_file() {
            return Err(CyclerError::ProfileNotFound(name.to_string()));
        }
        let backup = match self.write_backup(name, &path) {
            Ok(backup_path) => BackupStatus::Written(backup_path),
            Err(e) => {
                warn!(profile = %name, error = %e, "Failed to back up profile before deletion");
                BackupStatus::Failed(e.to_string())
            }
        };
        if matches!(backup, BackupStatus::Written(_))
            && let Err(e) = self.prune_backups(name)
        {
            warn!(profile = %name, error = %e, "Failed to prune backups");
        }
        fs::remove_file(&path).map_err(|e| CyclerError::io(&path, e))?;
        info!(profile = %name, "Deleted profile");
        if let Err(e) = self.purge_expired_backups() {
            warn!(error = %e, "Failed to purge expired backups");
        }
        Ok(backup)
    }

    /// Replace (or recreate) `name` with its most recent backup
    pub fn restore_latest_backup(&self, name: &str) -> Result<SaveOutcome> {
        validate_name(name)?;
        let latest = self
            .backups(name)?
            .pop()
            .ok_or_else(|| CyclerError::NoBackup(name.to_string()))?;
        let contents = fs::read_to_string(&latest.path).map_err(|e| CyclerError::io(&latest.path, e))?;
        let mut profile = parse_document(name, &contents)?;
        profile.name = name.to_string();
        profile.modified_at = Utc::now();
        info!(profile = %name, backup = %latest.path.display(), "Restoring profile from backup");
        self.save_profile(&profile)
    }

    /// Import a document from anywhere on disk. On a name collision the
    /// import is stored as `name_1`, `name_2`, ... unless `overwrite` is set.
    /// Returns the name it was stored under.
    pub fn import(&self, path: &Path, overwrite: bool) -> Result<String> {
        let contents = fs::read_to_string(path).map_err(|e| CyclerError::io(path, e))?;
        let mut profile = parse_document(&path.display().to_string(), &contents)?;
        validate_name(&profile.name)?;

        if !overwrite && self.exists(&profile.name) {
            let base = profile.name.clone();
            let free = (1..)
                .map(|n| format!("{base}_{n}"))
                .find(|candidate| !self.exists(candidate))
                .ok_or_else(|| CyclerError::ProfileExists(base.clone()))?;
            info!(original = %base, renamed = %free, "Profile name taken, importing under new name");
            profile.name = free;
        }
        validate_name(&profile.name)?;
        profile.modified_at = Utc::now();
        self.save_profile(&profile)?;
        info!(profile = %profile.name, source = %path.display(), "Imported profile");
        Ok(profile.name)
    }

    pub fn export(&self, name: &str, destination: &Path) -> Result<()> {
        let profile = self.read(name)?;
        let json = serde_json::to_string_pretty(&profile)?;
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| CyclerError::io(parent, e))?;
        }
        write_atomic(destination, &json)?;
        info!(profile = %name, destination = %destination.display(), "Exported profile");
        Ok(())
    }
}
