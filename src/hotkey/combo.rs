use std::fmt;
use std::str::FromStr;

use super::keys::{Key, MouseButton};
use crate::error::CyclerError;

/// Primary trigger of a combo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Key(Key),
    Mouse(MouseButton),
}

impl Trigger {
    pub fn name(self) -> &'static str {
        match self {
            Self::Key(key) => key.name(),
            Self::Mouse(button) => button.name(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Key(key) => key.label(),
            Self::Mouse(button) => button.label(),
        }
    }

    pub fn is_mouse(self) -> bool {
        matches!(self, Self::Mouse(_))
    }
}

/// Modifier set; order-insensitive by construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        ctrl: false,
        alt: false,
        shift: false,
    };

    pub fn is_empty(self) -> bool {
        !(self.ctrl || self.alt || self.shift)
    }

    /// Modifier names in canonical order
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(3);
        if self.ctrl {
            names.push("ctrl");
        }
        if self.alt {
            names.push("alt");
        }
        if self.shift {
            names.push("shift");
        }
        names
    }

    pub fn labels(self) -> Vec<&'static str> {
        let mut labels = Vec::with_capacity(3);
        if self.ctrl {
            labels.push("Ctrl");
        }
        if self.alt {
            labels.push("Alt");
        }
        if self.shift {
            labels.push("Shift");
        }
        labels
    }

    /// Set the modifier named `name`; returns false for unknown names or
    /// when the modifier is already set
    pub fn insert_named(&mut self, name: &str) -> bool {
        let slot = match name.trim().to_ascii_lowercase().as_str() {
            "ctrl" | "control" => &mut self.ctrl,
            "alt" | "menu" => &mut self.alt,
            "shift" => &mut self.shift,
            _ => return false,
        };
        if *slot {
            return false;
        }
        *slot = true;
        true
    }
}

/// A trigger plus modifiers. Equality is structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HotkeyCombo {
    pub trigger: Trigger,
    pub modifiers: Modifiers,
}

impl HotkeyCombo {
    pub fn new(trigger: Trigger, modifiers: Modifiers) -> Self {
        Self { trigger, modifiers }
    }

    pub fn key(key: Key) -> Self {
        Self::new(Trigger::Key(key), Modifiers::NONE)
    }

    pub fn mouse(button: MouseButton) -> Self {
        Self::new(Trigger::Mouse(button), Modifiers::NONE)
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Display form, e.g. `Ctrl+Alt+Mouse 5`
    pub fn label(&self) -> String {
        let mut parts = self.modifiers.labels();
        parts.push(self.trigger.label());
        parts.join("+")
    }
}

/// Canonical textual form, e.g. `ctrl+alt+mouse5`
impl fmt::Display for HotkeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in self.modifiers.names() {
            write!(f, "{name}+")?;
        }
        f.write_str(self.trigger.name())
    }
}

impl FromStr for HotkeyCombo {
    type Err = CyclerError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || CyclerError::InvalidHotkey(text.to_string());
        let mut modifiers = Modifiers::NONE;
        let mut trigger = None;

        for part in text.split('+') {
            let part = part.trim();
            if part.is_empty() {
                return Err(invalid());
            }
            if modifiers.insert_named(part) {
                continue;
            }
            let parsed = Key::from_name(part)
                .map(Trigger::Key)
                .or_else(|| MouseButton::from_name(part).map(Trigger::Mouse));
            // Unknown part, repeated modifier or a second trigger
            match (parsed, trigger) {
                (Some(found), None) => trigger = Some(found),
                _ => return Err(invalid()),
            }
        }

        trigger
            .map(|trigger| Self::new(trigger, modifiers))
            .ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let combo: HotkeyCombo = "ctrl+mouse5".parse().unwrap();
        assert_eq!(combo.trigger, Trigger::Mouse(MouseButton::Side2));
        assert!(combo.modifiers.ctrl && !combo.modifiers.alt && !combo.modifiers.shift);
        assert_eq!(combo.to_string(), "ctrl+mouse5");
        assert_eq!(combo.label(), "Ctrl+Mouse 5");
    }

    #[test]
    fn test_modifier_order_is_irrelevant() {
        let a: HotkeyCombo = "shift+ctrl+F2".parse().unwrap();
        let b: HotkeyCombo = "Ctrl + f2 + SHIFT".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "ctrl+shift+f2");
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        for text in ["", "ctrl", "ctrl+", "ctrl+ctrl+a", "a+b", "hyper+a", "mouse9"] {
            assert!(text.parse::<HotkeyCombo>().is_err(), "accepted {text:?}");
        }
    }

    #[test]
    fn test_plain_key() {
        let combo: HotkeyCombo = "tab".parse().unwrap();
        assert_eq!(combo, HotkeyCombo::key(Key::Tab));
        assert!(combo.modifiers.is_empty());
        assert!(!combo.trigger.is_mouse());
    }
}
