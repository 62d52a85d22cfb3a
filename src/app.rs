//! The cycler: wires registry, engine, activator, hotkey backend and
//! profile store together and reports what happens as [`CycleEvent`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::activation::{ActivationError, LadderStep, WindowActivator};
use crate::config::Settings;
use crate::constants::hotkey;
use crate::cycle_state::{CycleOutcome, CycleStats, CyclingEngine};
use crate::error::{CyclerError, Result};
use crate::hotkey::{CaptureCancel, HotkeyBackend, HotkeyCombo, HotkeyState, StrategyKind};
use crate::persistence::{LoadedProfile, ProfileStore, SaveOutcome};
use crate::platform::NativePlatform;
use crate::registry::{RefreshReport, WindowRegistry};
use crate::types::{GameWindow, WindowId};

/// Everything a presentation layer may want to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    Activated { window: GameWindow, step: LadderStep },
    ActivationFailed { window: WindowId, reason: String },
    NothingToCycle,
    AllActivationsFailed,
    HotkeyArmed { combo: HotkeyCombo, strategy: StrategyKind },
    HotkeyUnavailable { combo: HotkeyCombo, reason: String },
    HotkeyDisarmed,
    WindowsChanged { added: usize, removed: usize, changed: usize },
    EnumerationFailed { reason: String },
}

pub struct Cycler {
    registry: Arc<WindowRegistry>,
    engine: CyclingEngine,
    activator: WindowActivator,
    backend: HotkeyBackend,
    store: ProfileStore,
    hotkey: Option<HotkeyCombo>,
    subscribers: Vec<Sender<CycleEvent>>,
}

impl Cycler {
    pub fn new(
        registry: Arc<WindowRegistry>,
        activator: WindowActivator,
        backend: HotkeyBackend,
        store: ProfileStore,
    ) -> Self {
        Self {
            registry,
            engine: CyclingEngine::new(),
            activator,
            backend,
            store,
            hotkey: None,
            subscribers: Vec::new(),
        }
    }

    /// Build a cycler on the native platform seams
    pub fn with_platform(platform: NativePlatform, settings: &Settings, store: ProfileStore) -> Self {
        let registry = Arc::new(WindowRegistry::new(platform.source));
        let activator = WindowActivator::new(platform.focus, settings.activation_settle());
        let backend = HotkeyBackend::new(platform.strategies, settings.debounce());
        Self::new(registry, activator, backend, store)
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&mut self) -> Receiver<CycleEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: CycleEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn registry(&self) -> &Arc<WindowRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn stats(&self) -> CycleStats {
        self.engine.stats()
    }

    pub fn hotkey(&self) -> Option<HotkeyCombo> {
        self.hotkey
    }

    pub fn hotkey_state(&self) -> HotkeyState {
        self.backend.state()
    }

    pub fn refresh(&mut self) -> RefreshReport {
        let report = self.registry.refresh();
        self.absorb(&report);
        report
    }

    fn absorb(&mut self, report: &RefreshReport) {
        self.engine.prune(&self.registry.snapshot());
        if let Some(reason) = &report.enumeration_error {
            self.emit(CycleEvent::EnumerationFailed { reason: reason.clone() });
        }
        if !report.is_empty() {
            self.emit(CycleEvent::WindowsChanged {
                added: report.added.len(),
                removed: report.removed.len(),
                changed: report.changed.len(),
            });
        }
    }

    pub fn set_selection(&mut self, ids: impl IntoIterator<Item = WindowId>) {
        self.engine.set_selection(ids);
    }

    pub fn selection(&self) -> &[WindowId] {
        self.engine.selection()
    }

    /// Selected windows still tracked by the registry, in cycle order
    pub fn selected_windows(&self) -> Vec<GameWindow> {
        let snapshot = self.registry.snapshot();
        self.engine
            .selection()
            .iter()
            .filter_map(|id| snapshot.get(*id).cloned())
            .collect()
    }

    pub fn arm(&mut self, combo: HotkeyCombo) -> Result<StrategyKind> {
        self.hotkey = Some(combo);
        match self.backend.arm(combo) {
            Ok(strategy) => {
                self.emit(CycleEvent::HotkeyArmed { combo, strategy });
                Ok(strategy)
            }
            Err(e) => {
                error!(combo = %combo, error = %e, "Hotkey unavailable, cycling disabled");
                self.emit(CycleEvent::HotkeyUnavailable {
                    combo,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub fn disarm(&mut self) -> Result<()> {
        let was_armed = self.backend.armed_combo().is_some();
        let result = self.backend.disarm();
        if was_armed {
            self.emit(CycleEvent::HotkeyDisarmed);
        }
        result
    }

    pub fn start_capture(&mut self, timeout: Duration, cancel: &CaptureCancel) -> Result<Option<HotkeyCombo>> {
        self.backend.start_capture(timeout, cancel)
    }

    /// Advance the cycle once, as if the hotkey had been pressed
    pub fn trigger(&mut self) -> CycleOutcome {
        let outcome = self.engine.on_trigger(&self.registry, &self.activator);
        match &outcome {
            CycleOutcome::Activated { window, step, failed } => {
                for (id, e) in failed {
                    self.emit(CycleEvent::ActivationFailed {
                        window: *id,
                        reason: e.to_string(),
                    });
                }
                self.emit(CycleEvent::Activated {
                    window: window.clone(),
                    step: *step,
                });
            }
            CycleOutcome::NothingToCycle => self.emit(CycleEvent::NothingToCycle),
            CycleOutcome::AllFailed { failed } => {
                for (id, e) in failed {
                    self.emit(CycleEvent::ActivationFailed {
                        window: *id,
                        reason: e.to_string(),
                    });
                }
                self.emit(CycleEvent::AllActivationsFailed);
            }
        }
        outcome
    }

    /// Focus one selected window directly
    pub fn focus(&mut self, id: WindowId) -> std::result::Result<LadderStep, ActivationError> {
        let result = self.engine.focus_entry(id, &self.registry, &self.activator);
        match &result {
            Ok(step) => {
                if let Some(window) = self.registry.get(id) {
                    self.emit(CycleEvent::Activated { window, step: *step });
                }
            }
            Err(e) => self.emit(CycleEvent::ActivationFailed {
                window: id,
                reason: e.to_string(),
            }),
        }
        result
    }

    /// Focus the first selected window of `character`. `None` when no
    /// selected window carries that name.
    pub fn focus_character(&mut self, character: &str) -> Option<std::result::Result<LadderStep, ActivationError>> {
        let matching = self.store.name_matching();
        let id = self
            .selected_windows()
            .into_iter()
            .find(|w| matching.same_character(&w.character_name, character))?
            .id;
        Some(self.focus(id))
    }

    pub fn reset_stats(&mut self) {
        self.engine.reset_stats();
    }

    /// Wait up to `timeout` for a debounced hotkey press and act on it
    pub fn process_next_trigger(&mut self, timeout: Duration) -> Option<CycleOutcome> {
        let observation = self.backend.recv_trigger(timeout)?;
        debug!(strategy = %observation.strategy, "Hotkey trigger");
        let outcome = self.trigger();
        self.backend.complete_trigger();
        Some(outcome)
    }

    /// Save the current selection and hotkey as `name`
    pub fn save_profile(&self, name: &str) -> Result<SaveOutcome> {
        let hotkey = self
            .hotkey
            .ok_or_else(|| CyclerError::InvalidProfile("no hotkey configured".to_string()))?;
        self.store.save(name, &self.selected_windows(), hotkey)
    }

    /// Load `name`, select its matched windows and arm its hotkey.
    ///
    /// A hotkey that cannot be armed is reported as an event; the selection
    /// is still applied.
    pub fn load_profile(&mut self, name: &str) -> Result<LoadedProfile> {
        let loaded = self.store.load(name, &self.registry)?;
        for descriptor in &loaded.unmatched {
            warn!(
                profile = %name,
                character = %descriptor.character_name,
                variant = %descriptor.game_variant,
                "No live window for profile entry"
            );
        }
        self.engine.set_selection(loaded.selection.iter().copied());
        if let Err(e) = self.arm(loaded.hotkey) {
            debug!(error = %e, "Profile loaded with hotkey disabled");
        }
        Ok(loaded)
    }

    /// Serve hotkey triggers until `stop` is set, refreshing the registry in
    /// the background every `refresh_interval`. The hotkey is disarmed
    /// before returning.
    pub fn run(&mut self, stop: &AtomicBool, refresh_interval: Duration) -> Result<()> {
        let (report_tx, report_rx) = mpsc::channel::<RefreshReport>();
        let refresher_stop = Arc::new(AtomicBool::new(false));
        let refresher = {
            let registry = self.registry.clone();
            let refresher_stop = refresher_stop.clone();
            thread::Builder::new()
                .name("registry-refresh".to_string())
                .spawn(move || {
                    let tick = Duration::from_millis(hotkey::STOP_CHECK_INTERVAL_MS);
                    let mut next = Instant::now() + refresh_interval;
                    while !refresher_stop.load(Ordering::SeqCst) {
                        if Instant::now() >= next {
                            if report_tx.send(registry.refresh()).is_err() {
                                break;
                            }
                            next = Instant::now() + refresh_interval;
                        }
                        thread::sleep(tick);
                    }
                })
                .map_err(|e| CyclerError::io("registry-refresh thread", e))?
        };

        info!(refresh_secs = refresh_interval.as_secs_f32(), "Cycler running");
        let tick = Duration::from_millis(hotkey::STOP_CHECK_INTERVAL_MS * 2);
        while !stop.load(Ordering::SeqCst) {
            while let Ok(report) = report_rx.try_recv() {
                self.absorb(&report);
            }
            self.process_next_trigger(tick);
        }

        refresher_stop.store(true, Ordering::SeqCst);
        if refresher.join().is_err() {
            warn!("Registry refresh thread panicked");
        }
        info!("Cycler stopping");
        self.disarm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::testing::FakeFocus;
    use crate::hotkey::strategy::testing::{FakeHandle, FakeStrategy};
    use crate::hotkey::{MouseButton, StrategyError};
    use crate::registry::testing::{FakeSource, game_window};

    struct Harness {
        cycler: Cycler,
        source: Arc<FakeSource>,
        hook: FakeHandle,
        native: FakeHandle,
        _dir: tempfile::TempDir,
    }

    fn harness(titles: &[&str], hook_blocked: bool) -> Harness {
        let windows = titles
            .iter()
            .enumerate()
            .map(|(i, t)| game_window(i as u64 + 1, t))
            .collect();
        let source = FakeSource::with_windows(windows);
        let registry = Arc::new(WindowRegistry::new(source.clone()));
        let activator = WindowActivator::new(FakeFocus::new(), Duration::ZERO);

        let (mut hook, hook_handle) = FakeStrategy::new(StrategyKind::Hook);
        if hook_blocked {
            hook = hook.failing(StrategyError::PermissionDenied("/dev/input".to_string()));
        }
        let (native, native_handle) = FakeStrategy::new(StrategyKind::NativeRegistration);
        let (polling, _) = FakeStrategy::new(StrategyKind::Polling);
        let backend = HotkeyBackend::new(
            vec![Box::new(hook), Box::new(native), Box::new(polling)],
            Duration::from_millis(150),
        );

        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        let mut cycler = Cycler::new(registry, activator, backend, store);
        cycler.refresh();
        Harness {
            cycler,
            source,
            hook: hook_handle,
            native: native_handle,
            _dir: dir,
        }
    }

    fn all_ids(cycler: &Cycler) -> Vec<WindowId> {
        cycler.registry().snapshot().windows().iter().map(|w| w.id).collect()
    }

    #[test]
    fn test_blocked_hook_falls_back_and_trigger_activates() {
        let mut h = harness(&["Iop-Bob - Dofus 2.71", "Cra-Bob - Dofus 2.71"], true);
        let events = h.cycler.subscribe();
        let ids = all_ids(&h.cycler);
        h.cycler.set_selection(ids);

        let combo = HotkeyCombo::mouse(MouseButton::Side1);
        assert_eq!(h.cycler.arm(combo).unwrap(), StrategyKind::NativeRegistration);
        assert_eq!(h.hook.armed(), None);

        assert!(h.native.fire());
        let outcome = h.cycler.process_next_trigger(Duration::from_secs(1)).unwrap();
        assert!(matches!(outcome, CycleOutcome::Activated { ref window, .. } if window.character_name == "Iop-Bob"));
        assert_eq!(h.cycler.hotkey_state(), HotkeyState::Armed);

        let received: Vec<CycleEvent> = events.try_iter().collect();
        assert_eq!(
            received[0],
            CycleEvent::HotkeyArmed {
                combo,
                strategy: StrategyKind::NativeRegistration
            }
        );
        assert!(matches!(&received[1], CycleEvent::Activated { window, step: LadderStep::Foreground } if window.character_name == "Iop-Bob"));
    }

    #[test]
    fn test_focus_and_focus_character_activate_selected_window() {
        let mut h = harness(&["Iop-Bob - Dofus 2.71", "Cra-Bob - Dofus 2.71"], false);
        let ids = all_ids(&h.cycler);
        h.cycler.set_selection(ids.clone());
        let events = h.cycler.subscribe();

        assert_eq!(h.cycler.focus(ids[1]), Ok(LadderStep::Foreground));
        assert!(matches!(events.try_recv().unwrap(), CycleEvent::Activated { window, .. } if window.id == ids[1]));

        assert_eq!(h.cycler.focus_character("Iop-Bob"), Some(Ok(LadderStep::Foreground)));
        assert_eq!(h.cycler.focus_character("Sacrieur-Bob"), None);
        assert_eq!(h.cycler.stats().activations, 2);

        assert!(matches!(
            h.cycler.focus(WindowId(999)),
            Err(ActivationError::Invalid(WindowId(999)))
        ));

        h.cycler.reset_stats();
        assert_eq!(h.cycler.stats(), CycleStats::default());
    }

    #[test]
    fn test_nothing_to_cycle_is_reported() {
        let mut h = harness(&[], false);
        let events = h.cycler.subscribe();
        assert_eq!(h.cycler.trigger(), CycleOutcome::NothingToCycle);
        assert_eq!(events.try_recv().unwrap(), CycleEvent::NothingToCycle);
    }

    #[test]
    fn test_refresh_reports_window_changes_and_prunes_selection() {
        let mut h = harness(&["Iop-Bob - Dofus 2.71", "Cra-Bob - Dofus 2.71"], false);
        let ids = all_ids(&h.cycler);
        h.cycler.set_selection(ids.clone());
        let events = h.cycler.subscribe();

        h.source.close(1);
        h.cycler.refresh();
        assert_eq!(h.cycler.selection(), &ids[1..]);
        assert_eq!(
            events.try_recv().unwrap(),
            CycleEvent::WindowsChanged {
                added: 0,
                removed: 1,
                changed: 0
            }
        );
    }

    #[test]
    fn test_profile_round_trip_through_cycler() {
        let mut h = harness(
            &["Iop-Bob - Dofus 2.71", "Eniripsa-Bob - Dofus 2.71", "Cra-Bob - Dofus 2.71"],
            false,
        );
        let mut ids = all_ids(&h.cycler);
        ids.reverse();
        h.cycler.set_selection(ids.clone());
        assert!(h.cycler.save_profile("trio").is_err());

        let combo: HotkeyCombo = "ctrl+f1".parse().unwrap();
        h.cycler.arm(combo).unwrap();
        h.cycler.save_profile("trio").unwrap();
        h.cycler.disarm().unwrap();
        h.cycler.set_selection([]);

        let loaded = h.cycler.load_profile("trio").unwrap();
        assert!(loaded.unmatched.is_empty());
        assert_eq!(h.cycler.selection(), ids.as_slice());
        assert_eq!(h.hook.armed(), Some(combo));
    }

    #[test]
    fn test_run_serves_triggers_until_stopped() {
        let mut h = harness(&["Iop-Bob - Dofus 2.71", "Cra-Bob - Dofus 2.71"], false);
        let ids = all_ids(&h.cycler);
        h.cycler.set_selection(ids);
        h.cycler.arm(HotkeyCombo::mouse(MouseButton::Side2)).unwrap();
        let events = h.cycler.subscribe();

        let stop = Arc::new(AtomicBool::new(false));
        let driver = {
            let stop = stop.clone();
            let hook = h.hook.clone();
            thread::spawn(move || {
                hook.fire();
                thread::sleep(Duration::from_millis(200));
                stop.store(true, Ordering::SeqCst);
            })
        };

        h.cycler.run(&stop, Duration::from_secs(60)).unwrap();
        driver.join().unwrap();

        assert_eq!(h.cycler.stats().activations, 1);
        assert_eq!(h.hook.armed(), None);
        let received: Vec<CycleEvent> = events.try_iter().collect();
        assert!(matches!(received.first(), Some(CycleEvent::Activated { .. })));
        assert_eq!(received.last(), Some(&CycleEvent::HotkeyDisarmed));
    }
}
