//! Ordered selection of windows and the cycle position
//!
//! `cursor` always points at the entry the next trigger will try first. It is
//! `Some(i)` with `i < entries.len()` whenever the selection is non-empty and
//! `None` otherwise.

use tracing::{debug, info, warn};

use crate::activation::{ActivationError, LadderStep, WindowActivator};
use crate::registry::{RegistrySnapshot, WindowRegistry};
use crate::types::{GameWindow, WindowId};

/// What one trigger did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Activated {
        window: GameWindow,
        step: LadderStep,
        /// Entries whose activation failed before this one succeeded
        failed: Vec<(WindowId, ActivationError)>,
    },
    NothingToCycle,
    /// A full lap was attempted and no window could be activated
    AllFailed { failed: Vec<(WindowId, ActivationError)> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub triggers: u64,
    pub activations: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
pub struct CyclingEngine {
    entries: Vec<WindowId>,
    cursor: Option<usize>,
    focused: Option<WindowId>,
    stats: CycleStats,
}

impl CyclingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> &[WindowId] {
        &self.entries
    }

    /// Entry the next trigger will try first
    pub fn next_entry(&self) -> Option<WindowId> {
        self.cursor.map(|i| self.entries[i])
    }

    pub fn focused(&self) -> Option<WindowId> {
        self.focused
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CycleStats::default();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the selection. Duplicates keep their first position.
    ///
    /// When the focused window is still selected the cycle continues after
    /// it; otherwise the next trigger starts from the first entry.
    pub fn set_selection(&mut self, ids: impl IntoIterator<Item = WindowId>) {
        let mut entries: Vec<WindowId> = Vec::new();
        for id in ids {
            if !entries.contains(&id) {
                entries.push(id);
            }
        }
        self.entries = entries;

        let focused_at = self
            .focused
            .and_then(|focused| self.entries.iter().position(|id| *id == focused));
        self.cursor = match focused_at {
            Some(position) => Some((position + 1) % self.entries.len()),
            None if self.entries.is_empty() => None,
            None => Some(0),
        };
        info!(entries = self.entries.len(), "Selection updated");
    }

    /// Remove the entry at `index`, keeping the cursor on the element that
    /// followed it
    fn remove_at(&mut self, index: usize) {
        self.entries.remove(index);
        self.cursor = match self.cursor {
            _ if self.entries.is_empty() => None,
            Some(cursor) if index < cursor => Some(cursor - 1),
            Some(cursor) if cursor >= self.entries.len() => Some(0),
            other => other,
        };
    }

    /// Drop entries the snapshot no longer tracks, preserving relative order
    pub fn prune(&mut self, snapshot: &RegistrySnapshot) -> Vec<WindowId> {
        let mut removed = Vec::new();
        let mut index = 0;
        while index < self.entries.len() {
            let id = self.entries[index];
            if snapshot.contains(id) {
                index += 1;
            } else {
                self.remove_at(index);
                removed.push(id);
            }
        }
        if !removed.is_empty() {
            debug!(removed = removed.len(), remaining = self.entries.len(), "Pruned stale selection entries");
        }
        if self.focused.is_some_and(|f| removed.contains(&f)) {
            self.focused = None;
        }
        removed
    }

    /// Focus the next valid entry, skipping and dropping stale ones and
    /// moving past failed activations for at most one lap
    pub fn on_trigger(&mut self, registry: &WindowRegistry, activator: &WindowActivator) -> CycleOutcome {
        self.stats.triggers += 1;
        let snapshot = registry.snapshot();
        self.prune(&snapshot);

        let mut failed = Vec::new();
        let lap = self.entries.len();
        for _ in 0..lap {
            let Some(index) = self.cursor else { break };
            let id = self.entries[index];

            let window = match snapshot.get(id) {
                Some(window) if registry.is_valid(id) => window,
                _ => {
                    debug!(id = %id, "Skipping invalid selection entry");
                    self.remove_at(index);
                    continue;
                }
            };

            match activator.activate(registry, window) {
                Ok(step) => {
                    self.stats.activations += 1;
                    self.focused = Some(id);
                    self.cursor = Some((index + 1) % self.entries.len());
                    return CycleOutcome::Activated {
                        window: window.clone(),
                        step,
                        failed,
                    };
                }
                Err(ActivationError::Invalid(_)) => {
                    self.remove_at(index);
                }
                Err(e) => {
                    warn!(window = %window.handle, character = %window.character_name, error = %e, "Activation failed, trying next window");
                    self.stats.failures += 1;
                    failed.push((id, e));
                    self.cursor = Some((index + 1) % self.entries.len());
                }
            }
        }

        if failed.is_empty() {
            info!("Nothing to cycle");
            CycleOutcome::NothingToCycle
        } else {
            CycleOutcome::AllFailed { failed }
        }
    }

    /// Activate one specific entry of the selection and continue the cycle
    /// from there
    pub fn focus_entry(
        &mut self,
        id: WindowId,
        registry: &WindowRegistry,
        activator: &WindowActivator,
    ) -> Result<LadderStep, ActivationError> {
        let Some(index) = self.entries.iter().position(|e| *e == id) else {
            return Err(ActivationError::Invalid(id));
        };
        let Some(window) = registry.get(id) else {
            self.remove_at(index);
            return Err(ActivationError::Invalid(id));
        };

        match activator.activate(registry, &window) {
            Ok(step) => {
                self.stats.activations += 1;
                self.focused = Some(id);
                self.cursor = Some((index + 1) % self.entries.len());
                Ok(step)
            }
            Err(e) => {
                if matches!(e, ActivationError::Invalid(_)) {
                    self.remove_at(index);
                } else {
                    self.stats.failures += 1;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::testing::FakeFocus;
    use crate::registry::testing::{FakeSource, game_window};
    use crate::types::WindowHandle;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        source: Arc<FakeSource>,
        registry: WindowRegistry,
        focus: Arc<FakeFocus>,
        activator: WindowActivator,
    }

    impl Fixture {
        fn new(titles: &[&str]) -> Self {
            let windows = titles
                .iter()
                .enumerate()
                .map(|(i, title)| game_window(i as u64 + 1, title))
                .collect();
            let source = FakeSource::with_windows(windows);
            let registry = WindowRegistry::new(source.clone());
            registry.refresh();
            let focus = FakeFocus::new();
            let activator = WindowActivator::new(focus.clone(), Duration::ZERO);
            Self {
                source,
                registry,
                focus,
                activator,
            }
        }

        fn id(&self, handle: u64) -> WindowId {
            self.registry.snapshot().by_handle(WindowHandle(handle)).unwrap().id
        }

        fn all_ids(&self) -> Vec<WindowId> {
            self.registry.snapshot().windows().iter().map(|w| w.id).collect()
        }

        fn trigger(&self, engine: &mut CyclingEngine) -> Option<String> {
            match engine.on_trigger(&self.registry, &self.activator) {
                CycleOutcome::Activated { window, .. } => Some(window.character_name),
                _ => None,
            }
        }
    }

    fn assert_cursor_invariant(engine: &CyclingEngine) {
        match engine.cursor {
            Some(i) => assert!(i < engine.entries.len()),
            None => assert!(engine.entries.is_empty()),
        }
    }

    #[test]
    fn test_empty_selection_reports_nothing_to_cycle() {
        let fx = Fixture::new(&["Iop-Bob - Dofus 2.71"]);
        let mut engine = CyclingEngine::new();
        assert_eq!(engine.on_trigger(&fx.registry, &fx.activator), CycleOutcome::NothingToCycle);
        assert_eq!(engine.stats().triggers, 1);
        assert!(fx.focus.log().is_empty());
    }

    #[test]
    fn test_iop_eniripsa_cra_scenario() {
        let fx = Fixture::new(&[
            "Iop-Bob - Dofus 2.71",
            "Eniripsa-Bob - Dofus 2.71",
            "Cra-Bob - Dofus 2.71",
        ]);
        let mut engine = CyclingEngine::new();
        engine.set_selection(fx.all_ids());

        let order: Vec<_> = (0..4).filter_map(|_| fx.trigger(&mut engine)).collect();
        assert_eq!(order, vec!["Iop-Bob", "Eniripsa-Bob", "Cra-Bob", "Iop-Bob"]);

        fx.source.close(2);
        fx.registry.refresh();

        let order: Vec<_> = (0..4).filter_map(|_| fx.trigger(&mut engine)).collect();
        assert_eq!(order, vec!["Cra-Bob", "Iop-Bob", "Cra-Bob", "Iop-Bob"]);
        assert_eq!(engine.selection().len(), 2);
    }

    #[test]
    fn test_n_triggers_return_to_start() {
        let fx = Fixture::new(&[
            "A-Bob - Dofus 2.71",
            "B-Bob - Dofus 2.71",
            "C-Bob - Dofus 2.71",
            "D-Bob - Dofus 2.71",
            "E-Bob - Dofus 2.71",
        ]);
        let mut engine = CyclingEngine::new();
        engine.set_selection(fx.all_ids());

        let start = fx.trigger(&mut engine).unwrap();
        for _ in 0..4 {
            fx.trigger(&mut engine).unwrap();
        }
        assert_eq!(fx.trigger(&mut engine).unwrap(), start);
    }

    #[test]
    fn test_window_closed_without_refresh_is_skipped() {
        let fx = Fixture::new(&["Iop-Bob - Dofus 2.71", "Cra-Bob - Dofus 2.71"]);
        let mut engine = CyclingEngine::new();
        engine.set_selection(fx.all_ids());

        fx.source.close(1);
        assert_eq!(fx.trigger(&mut engine).as_deref(), Some("Cra-Bob"));
        assert_eq!(engine.selection(), &[fx.id(2)]);
        assert_eq!(fx.trigger(&mut engine).as_deref(), Some("Cra-Bob"));
    }

    #[test]
    fn test_failed_activation_moves_on_within_one_lap() {
        let fx = Fixture::new(&["Iop-Bob - Dofus 2.71", "Cra-Bob - Dofus 2.71"]);
        fx.focus.make_unreachable(1);
        let mut engine = CyclingEngine::new();
        engine.set_selection(fx.all_ids());

        match engine.on_trigger(&fx.registry, &fx.activator) {
            CycleOutcome::Activated { window, failed, .. } => {
                assert_eq!(window.character_name, "Cra-Bob");
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].0, fx.id(1));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Unreachable windows stay selected, unlike closed ones
        assert_eq!(engine.selection().len(), 2);
    }

    #[test]
    fn test_all_failing_gives_up_after_one_lap() {
        let fx = Fixture::new(&["Iop-Bob - Dofus 2.71", "Cra-Bob - Dofus 2.71"]);
        fx.focus.make_unreachable(1);
        fx.focus.make_unreachable(2);
        let mut engine = CyclingEngine::new();
        engine.set_selection(fx.all_ids());

        match engine.on_trigger(&fx.registry, &fx.activator) {
            CycleOutcome::AllFailed { failed } => assert_eq!(failed.len(), 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.stats().failures, 2);
        assert_eq!(engine.stats().activations, 0);
    }

    #[test]
    fn test_set_selection_keeps_focused_position() {
        let fx = Fixture::new(&[
            "Iop-Bob - Dofus 2.71",
            "Eniripsa-Bob - Dofus 2.71",
            "Cra-Bob - Dofus 2.71",
        ]);
        let (iop, eni, cra) = (fx.id(1), fx.id(2), fx.id(3));
        let mut engine = CyclingEngine::new();
        engine.set_selection([iop, eni, cra]);
        fx.trigger(&mut engine);
        fx.trigger(&mut engine);
        assert_eq!(engine.focused(), Some(eni));

        // Reordered: Eniripsa stays focused, Iop follows it
        engine.set_selection([cra, eni, iop]);
        assert_eq!(engine.next_entry(), Some(iop));

        // Focused entry dropped: restart from the first entry
        engine.set_selection([cra, iop]);
        assert_eq!(engine.next_entry(), Some(cra));
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let fx = Fixture::new(&["Iop-Bob - Dofus 2.71", "Cra-Bob - Dofus 2.71"]);
        let mut engine = CyclingEngine::new();
        engine.set_selection([fx.id(1), fx.id(2), fx.id(1)]);
        assert_eq!(engine.selection(), &[fx.id(1), fx.id(2)]);
    }

    #[test]
    fn test_focus_entry_continues_from_there() {
        let fx = Fixture::new(&[
            "Iop-Bob - Dofus 2.71",
            "Eniripsa-Bob - Dofus 2.71",
            "Cra-Bob - Dofus 2.71",
        ]);
        let mut engine = CyclingEngine::new();
        engine.set_selection(fx.all_ids());

        engine.focus_entry(fx.id(2), &fx.registry, &fx.activator).unwrap();
        assert_eq!(fx.trigger(&mut engine).as_deref(), Some("Cra-Bob"));
        assert!(engine.focus_entry(WindowId(999), &fx.registry, &fx.activator).is_err());
    }

    #[test]
    fn test_reset_stats_keeps_selection_and_cursor() {
        let fx = Fixture::new(&["Iop-Bob - Dofus 2.71", "Cra-Bob - Dofus 2.71"]);
        let mut engine = CyclingEngine::new();
        engine.set_selection(fx.all_ids());
        fx.trigger(&mut engine);
        assert_eq!(engine.stats().activations, 1);

        engine.reset_stats();
        assert_eq!(engine.stats(), CycleStats::default());
        assert_eq!(fx.trigger(&mut engine).as_deref(), Some("Cra-Bob"));
    }

    #[test]
    fn test_cursor_invariant_under_churn() {
        let titles: Vec<String> = (1..=6).map(|i| format!("Char{i} - Dofus 2.71")).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let fx = Fixture::new(&refs);
        let mut engine = CyclingEngine::new();
        engine.set_selection(fx.all_ids());
        assert_cursor_invariant(&engine);

        // Close windows one by one, triggering and re-selecting in between
        for handle in [3u64, 1, 6, 2, 5, 4] {
            fx.trigger(&mut engine);
            assert_cursor_invariant(&engine);
            fx.source.close(handle);
            fx.trigger(&mut engine);
            assert_cursor_invariant(&engine);
            fx.registry.refresh();
            engine.prune(&fx.registry.snapshot());
            assert_cursor_invariant(&engine);
            let mut ids = engine.selection().to_vec();
            ids.reverse();
            engine.set_selection(ids);
            assert_cursor_invariant(&engine);
        }
        assert!(engine.is_empty());
        assert_eq!(engine.on_trigger(&fx.registry, &fx.activator), CycleOutcome::NothingToCycle);
    }
}
