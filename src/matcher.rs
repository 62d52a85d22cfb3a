//! Game client detection
//!
//! The registry evaluates a list of [`GameMatcher`]s in order; the first
//! matcher that claims a window decides its variant and character name.
//! Supporting a new game means appending a matcher.

use crate::constants::games;
use crate::types::{GameVariant, RawWindow};

/// Result of a successful match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowMatch {
    pub variant: GameVariant,
    pub character_name: String,
}

pub trait GameMatcher: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn match_window(&self, window: &RawWindow) -> Option<WindowMatch>;
}

/// Matchers for every supported game, in evaluation order
pub fn default_matchers() -> Vec<Box<dyn GameMatcher>> {
    vec![Box::new(DofusMatcher), Box::new(WakfuMatcher)]
}

/// Process names that may host any game and need a title keyword to decide
fn is_generic_host(process_name: &str) -> bool {
    process_name.is_empty()
        || games::JAVA_PROCESSES.contains(&process_name)
        || games::WINE_PROCESSES.contains(&process_name)
}

fn is_launcher(title_lower: &str) -> bool {
    games::LAUNCHER_TITLES.iter().any(|t| title_lower.contains(t))
}

/// Claims a window when its process is a game executable, or when a generic
/// host (JVM, Wine, unknown) shows a title containing `keyword`
fn claims(window: &RawWindow, processes: &[&str], keyword: &str) -> bool {
    if !window.visible || window.title.trim().is_empty() {
        return false;
    }
    let title_lower = window.title.to_lowercase();
    if is_launcher(&title_lower) {
        return false;
    }
    let process = window.process_name.as_str();
    processes.contains(&process) || (is_generic_host(process) && title_lower.contains(keyword))
}

/// Dofus 2, Dofus Retro and Dofus 3 (Unity)
pub struct DofusMatcher;

impl DofusMatcher {
    fn variant(title: &str) -> GameVariant {
        let title_lower = title.to_lowercase();
        if title_lower.contains(games::RETRO_KEYWORD) {
            return GameVariant::DofusRetro;
        }
        // Unity clients show "Name - Class - 3.x.y.z - Release"
        let unity_version = split_title(title)
            .iter()
            .any(|part| part.starts_with("3.") && is_version_like(part));
        if title_lower.contains(games::UNITY_KEYWORD) || unity_version {
            GameVariant::DofusUnity
        } else {
            GameVariant::DofusClassic
        }
    }
}

impl GameMatcher for DofusMatcher {
    fn name(&self) -> &'static str {
        "dofus"
    }

    fn match_window(&self, window: &RawWindow) -> Option<WindowMatch> {
        if !claims(window, games::DOFUS_PROCESSES, games::DOFUS_KEYWORD) {
            return None;
        }
        Some(WindowMatch {
            variant: Self::variant(&window.title),
            character_name: extract_character_name(&window.title),
        })
    }
}

pub struct WakfuMatcher;

impl GameMatcher for WakfuMatcher {
    fn name(&self) -> &'static str {
        "wakfu"
    }

    fn match_window(&self, window: &RawWindow) -> Option<WindowMatch> {
        if !claims(window, games::WAKFU_PROCESSES, games::WAKFU_KEYWORD) {
            return None;
        }
        Some(WindowMatch {
            variant: GameVariant::Wakfu,
            character_name: extract_character_name(&window.title),
        })
    }
}

fn split_title(title: &str) -> Vec<String> {
    let mut parts = vec![title.to_string()];
    for separator in games::TITLE_SEPARATORS {
        parts = parts
            .iter()
            .flat_map(|part| part.split(separator))
            .map(str::to_string)
            .collect();
    }
    parts
        .into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| part.chars().count() > 1)
        .collect()
}

fn is_version_like(text: &str) -> bool {
    let digits: String = text.chars().filter(|c| *c != '.' && *c != '-').collect();
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn looks_like_character_name(text: &str) -> bool {
    let len = text.chars().count();
    if !(2..=games::MAX_CHARACTER_NAME_LEN).contains(&len) {
        return false;
    }
    if !text.chars().any(char::is_alphabetic) || is_version_like(text) {
        return false;
    }
    !games::COMMON_TITLE_WORDS.contains(&text.to_lowercase().as_str())
}

fn truncate(text: &str) -> String {
    if text.chars().count() > games::MAX_FALLBACK_NAME_LEN {
        let head: String = text.chars().take(games::MAX_FALLBACK_NAME_LEN).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Pick the character name out of a client title.
///
/// The title is split on the usual separators; segments mentioning the game,
/// launcher or server, version numbers and generic words are discarded and
/// the shortest remaining segment wins (server names tend to be longer).
pub fn extract_character_name(title: &str) -> String {
    if title.trim().chars().count() < 3 {
        return games::UNKNOWN_CHARACTER.to_string();
    }
    let parts = split_title(title);

    let mut candidates: Vec<&String> = parts
        .iter()
        .filter(|part| {
            let lower = part.to_lowercase();
            !games::NON_CHARACTER_TERMS.iter().any(|term| lower.contains(term))
        })
        .filter(|part| looks_like_character_name(part))
        .collect();
    // Stable sort keeps title order among equal lengths
    candidates.sort_by_key(|part| part.chars().count());
    if let Some(best) = candidates.first() {
        return best.to_string();
    }

    let mut generic: Vec<&String> = parts
        .iter()
        .filter(|part| (3..20).contains(&part.chars().count()))
        .collect();
    generic.sort_by_key(|part| part.chars().count());
    match (generic.first(), parts.first()) {
        (Some(best), _) => best.to_string(),
        (None, Some(first)) => truncate(first),
        (None, None) => truncate(title.trim()),
    }
}
