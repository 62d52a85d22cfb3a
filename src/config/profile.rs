//! Profile document: a named selection plus its hotkey
//!
//! Windows are stored as (character name, game variant) descriptors; raw
//! handles are never persisted since they do not survive a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::constants::config;
use crate::error::{CyclerError, Result};
use crate::hotkey::{HotkeyCombo, Key, Modifiers, MouseButton, Trigger};
use crate::types::WindowDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HotkeyKind {
    Key,
    MouseButton,
}

/// Persisted form of a [`HotkeyCombo`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyDocument {
    pub kind: HotkeyKind,
    pub value: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

impl From<HotkeyCombo> for HotkeyDocument {
    fn from(combo: HotkeyCombo) -> Self {
        let (kind, value) = match combo.trigger {
            Trigger::Key(key) => (HotkeyKind::Key, key.name()),
            Trigger::Mouse(button) => (HotkeyKind::MouseButton, button.name()),
        };
        Self {
            kind,
            value: value.to_string(),
            modifiers: combo.modifiers.labels().into_iter().map(str::to_string).collect(),
        }
    }
}

impl TryFrom<&HotkeyDocument> for HotkeyCombo {
    type Error = CyclerError;

    fn try_from(doc: &HotkeyDocument) -> Result<Self> {
        let invalid = || CyclerError::InvalidHotkey(format!("{:?} {}", doc.kind, doc.value));
        let trigger = match doc.kind {
            HotkeyKind::Key => Key::from_name(&doc.value).map(Trigger::Key),
            HotkeyKind::MouseButton => MouseButton::from_name(&doc.value).map(Trigger::Mouse),
        }
        .ok_or_else(invalid)?;

        let mut modifiers = Modifiers::NONE;
        for name in &doc.modifiers {
            if !modifiers.insert_named(name) {
                return Err(invalid());
            }
        }
        Ok(HotkeyCombo::new(trigger, modifiers))
    }
}

fn default_format_version() -> u32 {
    config::PROFILE_FORMAT_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub hotkey: HotkeyDocument,
    #[serde(default)]
    pub windows: Vec<WindowDescriptor>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(name: impl Into<String>, windows: Vec<WindowDescriptor>, hotkey: HotkeyCombo) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            format_version: config::PROFILE_FORMAT_VERSION,
            description: String::new(),
            hotkey: hotkey.into(),
            windows,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn combo(&self) -> Result<HotkeyCombo> {
        HotkeyCombo::try_from(&self.hotkey)
    }

    /// Descriptors sorted by their `order` field
    pub fn ordered_windows(&self) -> Vec<&WindowDescriptor> {
        let mut windows: Vec<&WindowDescriptor> = self.windows.iter().collect();
        windows.sort_by_key(|w| w.order);
        windows
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CyclerError::InvalidProfile("name is empty".to_string()));
        }
        if self.format_version > config::PROFILE_FORMAT_VERSION {
            return Err(CyclerError::InvalidProfile(format!(
                "format version {} is newer than supported version {}",
                self.format_version,
                config::PROFILE_FORMAT_VERSION
            )));
        }
        if self.windows.is_empty() {
            return Err(CyclerError::InvalidProfile("no windows selected".to_string()));
        }
        let mut orders = HashSet::new();
        for window in &self.windows {
            if window.character_name.trim().is_empty() {
                return Err(CyclerError::InvalidProfile("window without character name".to_string()));
            }
            if !orders.insert(window.order) {
                return Err(CyclerError::InvalidProfile(format!("duplicate order {}", window.order)));
            }
        }
        self.combo()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameVariant;

    fn descriptor(name: &str, order: usize) -> WindowDescriptor {
        WindowDescriptor {
            character_name: name.to_string(),
            game_variant: GameVariant::DofusUnity,
            order,
        }
    }

    #[test]
    fn test_document_shape() {
        let combo: HotkeyCombo = "ctrl+shift+mouse4".parse().unwrap();
        let profile = Profile::new("raid", vec![descriptor("Iop-Bob", 0)], combo);
        let json = serde_json::to_value(&profile).unwrap();

        assert_eq!(json["name"], "raid");
        assert_eq!(json["formatVersion"], 1);
        assert_eq!(json["hotkey"]["kind"], "mouseButton");
        assert_eq!(json["hotkey"]["value"], "mouse4");
        assert_eq!(json["hotkey"]["modifiers"], serde_json::json!(["Ctrl", "Shift"]));
        assert_eq!(json["windows"][0]["characterName"], "Iop-Bob");
        assert!(json["createdAt"].is_string());
        assert!(json["modifiedAt"].is_string());
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_hotkey_document_round_trip() {
        for text in ["f1", "alt+tab", "ctrl+alt+shift+mouse5", "middle"] {
            let combo: HotkeyCombo = text.parse().unwrap();
            let doc = HotkeyDocument::from(combo);
            assert_eq!(HotkeyCombo::try_from(&doc).unwrap(), combo);
        }
    }

    #[test]
    fn test_bad_hotkey_document_rejected() {
        let doc = HotkeyDocument {
            kind: HotkeyKind::MouseButton,
            value: "f1".to_string(),
            modifiers: vec![],
        };
        assert!(HotkeyCombo::try_from(&doc).is_err());
        let doc = HotkeyDocument {
            kind: HotkeyKind::Key,
            value: "f1".to_string(),
            modifiers: vec!["Ctrl".to_string(), "ctrl".to_string()],
        };
        assert!(HotkeyCombo::try_from(&doc).is_err());
    }

    #[test]
    fn test_ordered_windows_sorts_by_order() {
        let profile = Profile::new(
            "p",
            vec![descriptor("C", 2), descriptor("A", 0), descriptor("B", 1)],
            HotkeyCombo::key(Key::F1),
        );
        let names: Vec<_> = profile.ordered_windows().iter().map(|w| w.character_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_validate() {
        let ok = Profile::new("p", vec![descriptor("A", 0)], HotkeyCombo::key(Key::F1));
        assert!(ok.validate().is_ok());

        let mut empty = ok.clone();
        empty.windows.clear();
        assert!(empty.validate().is_err());

        let mut duplicate = ok.clone();
        duplicate.windows.push(descriptor("B", 0));
        assert!(duplicate.validate().is_err());

        let mut future = ok.clone();
        future.format_version = 99;
        assert!(future.validate().is_err());

        let mut unnamed = ok;
        unnamed.name = "  ".to_string();
        assert!(unnamed.validate().is_err());
    }
}
