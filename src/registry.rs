//! Tracks live game client windows
//!
//! Readers take an `Arc` of the current [`RegistrySnapshot`]; `refresh()`
//! builds a new snapshot and swaps it in, so a reader never observes a
//! half-reconciled window list.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::matcher::{GameMatcher, default_matchers};
use crate::platform::WindowSource;
use crate::types::{GameWindow, ProcessInfo, RawWindow, WindowHandle, WindowId};

/// Immutable view of the tracked windows, in enumeration order
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    windows: Vec<GameWindow>,
}

impl RegistrySnapshot {
    pub fn windows(&self) -> &[GameWindow] {
        &self.windows
    }

    pub fn get(&self, id: WindowId) -> Option<&GameWindow> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.get(id).is_some()
    }

    pub fn by_handle(&self, handle: WindowHandle) -> Option<&GameWindow> {
        self.windows.iter().find(|w| w.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub added: Vec<GameWindow>,
    /// Entries that disappeared; their `valid` flag is false
    pub removed: Vec<GameWindow>,
    /// Surviving entries whose title, character or minimized flag changed
    pub changed: Vec<GameWindow>,
    /// Set when enumeration failed and only a liveness sweep was done
    pub enumeration_error: Option<String>,
}

impl RefreshReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

pub struct WindowRegistry {
    source: Arc<dyn WindowSource>,
    matchers: Vec<Box<dyn GameMatcher>>,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    next_id: AtomicU64,
    refresh_lock: Mutex<()>,
}

impl WindowRegistry {
    pub fn new(source: Arc<dyn WindowSource>) -> Self {
        Self::with_matchers(source, default_matchers())
    }

    pub fn with_matchers(source: Arc<dyn WindowSource>, matchers: Vec<Box<dyn GameMatcher>>) -> Self {
        Self {
            source,
            matchers,
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::default())),
            next_id: AtomicU64::new(1),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Append a matcher, evaluated after the existing ones
    pub fn register_matcher(&mut self, matcher: Box<dyn GameMatcher>) {
        self.matchers.push(matcher);
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get(&self, id: WindowId) -> Option<GameWindow> {
        self.snapshot().get(id).cloned()
    }

    /// Cheap liveness check: the entry is tracked, its handle still resolves
    /// and its process is still running
    pub fn is_valid(&self, id: WindowId) -> bool {
        match self.snapshot().get(id) {
            Some(window) => self.is_alive(window.handle, window.process.pid),
            None => false,
        }
    }

    fn is_alive(&self, handle: WindowHandle, pid: u32) -> bool {
        self.source.window_exists(handle) && (pid == 0 || self.source.process_alive(pid))
    }

    fn issue_id(&self) -> WindowId {
        WindowId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn match_raw(&self, raw: &RawWindow) -> Option<(crate::matcher::WindowMatch, &'static str)> {
        self.matchers
            .iter()
            .find_map(|m| m.match_window(raw).map(|found| (found, m.name())))
    }

    /// Re-enumerate OS windows and reconcile against the previous snapshot.
    ///
    /// An empty result is normal. If enumeration fails the previous entries
    /// are kept when still alive and the failure is recorded in the report.
    pub fn refresh(&self) -> RefreshReport {
        let _guard = self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.snapshot();
        let mut report = RefreshReport::default();

        let raws = match self.source.enumerate() {
            Ok(raws) => raws,
            Err(e) => {
                warn!(error = %e, "Window enumeration failed, keeping live entries");
                report.enumeration_error = Some(e.to_string());
                let mut kept = Vec::with_capacity(previous.len());
                for window in previous.windows() {
                    if self.is_alive(window.handle, window.process.pid) {
                        kept.push(window.clone());
                    } else {
                        report.removed.push(invalidated(window));
                    }
                }
                self.swap(kept);
                return report;
            }
        };

        let mut previous_by_handle: HashMap<WindowHandle, &GameWindow> =
            previous.windows().iter().map(|w| (w.handle, w)).collect();
        let mut windows = Vec::new();

        for raw in &raws {
            let Some((found, matcher)) = self.match_raw(raw) else {
                continue;
            };

            // Left in previous_by_handle, so a tracked entry is reported removed
            if raw.pid != 0 && !self.source.process_alive(raw.pid) {
                debug!(window = %raw.handle, pid = raw.pid, "Skipping window of a dead process");
                continue;
            }

            let survivor = previous_by_handle
                .remove(&raw.handle)
                .filter(|old| old.process.pid == raw.pid);

            let window = match survivor {
                Some(old) => {
                    let mut window = old.clone();
                    window.title = raw.title.clone();
                    window.character_name = found.character_name;
                    window.variant = found.variant;
                    window.minimized = raw.minimized;
                    if window != *old {
                        debug!(window = %window.handle, character = %window.character_name, "Window changed");
                        report.changed.push(window.clone());
                    }
                    window
                }
                None => {
                    if let Some(old) = previous.by_handle(raw.handle) {
                        // Same handle, different process: a new instance
                        report.removed.push(invalidated(old));
                    }
                    let window = GameWindow {
                        id: self.issue_id(),
                        handle: raw.handle,
                        title: raw.title.clone(),
                        character_name: found.character_name,
                        variant: found.variant,
                        process: ProcessInfo {
                            pid: raw.pid,
                            name: raw.process_name.clone(),
                        },
                        minimized: raw.minimized,
                        valid: true,
                    };
                    info!(
                        window = %window.handle,
                        id = %window.id,
                        matcher = matcher,
                        character = %window.character_name,
                        variant = %window.variant,
                        "Game window detected"
                    );
                    report.added.push(window.clone());
                    window
                }
            };
            windows.push(window);
        }

        for (_, gone) in previous_by_handle {
            info!(window = %gone.handle, character = %gone.character_name, "Game window closed");
            report.removed.push(invalidated(gone));
        }

        self.swap(windows);
        report
    }

    fn swap(&self, windows: Vec<GameWindow>) {
        let next = Arc::new(RegistrySnapshot { windows });
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

fn invalidated(window: &GameWindow) -> GameWindow {
    GameWindow {
        valid: false,
        ..window.clone()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeSource, game_window};
    use super::*;

    #[test]
    fn test_refresh_detects_games_only() {
        let mut notepad = game_window(3, "Untitled - Notepad");
        notepad.process_name = "notepad.exe".to_string();
        let source = FakeSource::with_windows(vec![
            game_window(1, "Iop-Bob - Dofus 2.71"),
            game_window(2, "Cra-Bob - Dofus 2.71"),
            notepad,
        ]);
        let registry = WindowRegistry::new(source);

        let report = registry.refresh();
        assert_eq!(report.added.len(), 2);
        assert!(report.removed.is_empty());
        let names: Vec<_> = registry
            .snapshot()
            .windows()
            .iter()
            .map(|w| w.character_name.clone())
            .collect();
        assert_eq!(names, vec!["Iop-Bob", "Cra-Bob"]);
    }

    #[test]
    fn test_no_game_running_is_not_an_error() {
        let registry = WindowRegistry::new(FakeSource::with_windows(vec![]));
        let report = registry.refresh();
        assert!(report.is_empty());
        assert!(report.enumeration_error.is_none());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_second_refresh_keeps_ids() {
        let source = FakeSource::with_windows(vec![game_window(1, "Iop-Bob - Dofus 2.71")]);
        let registry = WindowRegistry::new(source);
        registry.refresh();
        let id = registry.snapshot().windows()[0].id;

        let report = registry.refresh();
        assert!(report.is_empty());
        assert_eq!(registry.snapshot().windows()[0].id, id);
    }

    #[test]
    fn test_closed_window_is_removed_and_invalid() {
        let source = FakeSource::with_windows(vec![
            game_window(1, "Iop-Bob - Dofus 2.71"),
            game_window(2, "Cra-Bob - Dofus 2.71"),
        ]);
        let registry = WindowRegistry::new(source.clone());
        registry.refresh();
        let iop = registry.snapshot().windows()[0].id;

        source.close(1);
        assert!(!registry.is_valid(iop));
        let report = registry.refresh();
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].id, iop);
        assert!(!report.removed[0].valid);
        assert!(!registry.snapshot().contains(iop));
    }

    #[test]
    fn test_dead_process_invalidates_window() {
        let source = FakeSource::with_windows(vec![game_window(1, "Iop-Bob - Dofus 2.71")]);
        let registry = WindowRegistry::new(source.clone());
        registry.refresh();
        let window = registry.snapshot().windows()[0].clone();

        source.kill_process(window.process.pid);
        assert!(!registry.is_valid(window.id));
        let report = registry.refresh();
        assert_eq!(report.removed.len(), 1);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_dead_process_window_is_not_recreated() {
        let source = FakeSource::with_windows(vec![game_window(1, "Iop-Bob - Dofus 2.71")]);
        let registry = WindowRegistry::new(source.clone());
        registry.refresh();
        let pid = registry.snapshot().windows()[0].process.pid;

        source.kill_process(pid);
        let first = registry.refresh();
        assert_eq!(first.removed.len(), 1);
        assert!(first.added.is_empty());

        for _ in 0..3 {
            let report = registry.refresh();
            assert!(report.is_empty());
            assert!(registry.snapshot().is_empty());
        }
    }

    #[test]
    fn test_reappearing_window_is_a_new_instance() {
        let source = FakeSource::with_windows(vec![game_window(1, "Iop-Bob - Dofus 2.71")]);
        let registry = WindowRegistry::new(source.clone());
        registry.refresh();
        let old = registry.snapshot().windows()[0].id;

        source.close(1);
        registry.refresh();
        source.open(game_window(1, "Iop-Bob - Dofus 2.71"));
        let report = registry.refresh();

        assert_eq!(report.added.len(), 1);
        assert_ne!(report.added[0].id, old);
        assert!(!registry.is_valid(old));
    }

    #[test]
    fn test_title_change_reported_as_changed() {
        let source = FakeSource::with_windows(vec![game_window(1, "Iop-Bob - Dofus 2.71")]);
        let registry = WindowRegistry::new(source.clone());
        registry.refresh();
        let id = registry.snapshot().windows()[0].id;

        source.set_title(1, "Iop-Alice - Dofus 2.71");
        let report = registry.refresh();
        assert_eq!(report.changed.len(), 1);
        assert_eq!(report.changed[0].id, id);
        assert_eq!(registry.get(id).unwrap().character_name, "Iop-Alice");
    }

    #[test]
    fn test_enumeration_failure_keeps_live_entries() {
        let source = FakeSource::with_windows(vec![
            game_window(1, "Iop-Bob - Dofus 2.71"),
            game_window(2, "Cra-Bob - Dofus 2.71"),
        ]);
        let registry = WindowRegistry::new(source.clone());
        registry.refresh();

        source.close(2);
        source.set_failing(true);
        let report = registry.refresh();
        assert!(report.enumeration_error.is_some());
        assert_eq!(report.removed.len(), 1);
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_snapshot_is_stable_across_refresh() {
        let source = FakeSource::with_windows(vec![game_window(1, "Iop-Bob - Dofus 2.71")]);
        let registry = WindowRegistry::new(source.clone());
        registry.refresh();
        let before = registry.snapshot();

        source.close(1);
        registry.refresh();
        assert_eq!(before.len(), 1);
        assert!(registry.snapshot().is_empty());
    }
}
