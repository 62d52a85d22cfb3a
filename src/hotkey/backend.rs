use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::combo::HotkeyCombo;
use super::debounce::Debouncer;
use super::strategy::{CaptureSink, HotkeyStrategy, StrategyKind, TriggerObservation, TriggerSink};
use crate::constants::hotkey;
use crate::error::{CyclerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyState {
    Idle,
    /// Capturing a new combo on every strategy
    Listening,
    Armed,
    /// A debounced trigger was handed out and not yet completed
    Triggered,
}

/// Cancels a running [`HotkeyBackend::start_capture`] from another thread
#[derive(Debug, Clone, Default)]
pub struct CaptureCancel(Arc<AtomicBool>);

impl CaptureCancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whenever `flag` is set, e.g. by a signal handler
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owns the strategies and the trigger state machine.
///
/// At most one strategy is armed at a time; observations from its listener
/// threads arrive on a bounded channel and are debounced here, on the
/// receiving side.
pub struct HotkeyBackend {
    strategies: Vec<Box<dyn HotkeyStrategy>>,
    state: HotkeyState,
    armed: Option<(HotkeyCombo, usize)>,
    trigger_tx: SyncSender<TriggerObservation>,
    trigger_rx: Receiver<TriggerObservation>,
    debouncer: Debouncer,
}

impl HotkeyBackend {
    pub fn new(mut strategies: Vec<Box<dyn HotkeyStrategy>>, debounce: Duration) -> Self {
        strategies.sort_by_key(|s| s.kind().priority());
        let (trigger_tx, trigger_rx) = sync_channel(hotkey::TRIGGER_CHANNEL_CAPACITY);
        Self {
            strategies,
            state: HotkeyState::Idle,
            armed: None,
            trigger_tx,
            trigger_rx,
            debouncer: Debouncer::new(debounce),
        }
    }

    pub fn state(&self) -> HotkeyState {
        self.state
    }

    pub fn armed_combo(&self) -> Option<HotkeyCombo> {
        self.armed.map(|(combo, _)| combo)
    }

    pub fn active_strategy(&self) -> Option<StrategyKind> {
        self.armed.map(|(_, index)| self.strategies[index].kind())
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debouncer.set_refractory(debounce);
    }

    /// Register `combo` with the first strategy that accepts it.
    ///
    /// A previously armed combo is released first. When every strategy
    /// refuses, the backend stays `Idle` and the per-strategy reasons are
    /// returned in [`CyclerError::HotkeyUnavailable`].
    pub fn arm(&mut self, combo: HotkeyCombo) -> Result<StrategyKind> {
        if self.state == HotkeyState::Listening {
            return Err(CyclerError::Busy("capture in progress".to_string()));
        }
        if self.armed.is_some() {
            self.disarm()?;
        }

        let mut attempts = Vec::new();
        for (index, strategy) in self.strategies.iter_mut().enumerate() {
            let kind = strategy.kind();
            if !strategy.supports(&combo) {
                debug!(strategy = %kind, combo = %combo, "Strategy cannot observe combo, skipping");
                attempts.push(format!("{kind}: cannot observe {}", combo.trigger.label()));
                continue;
            }
            match strategy.try_arm(combo, TriggerSink::new(self.trigger_tx.clone(), kind)) {
                Ok(()) => {
                    info!(strategy = %kind, combo = %combo, "Hotkey armed");
                    self.armed = Some((combo, index));
                    self.state = HotkeyState::Armed;
                    self.debouncer.reset();
                    return Ok(kind);
                }
                Err(e) => {
                    warn!(strategy = %kind, combo = %combo, error = %e, "Strategy failed to arm, trying next");
                    attempts.push(format!("{kind}: {e}"));
                }
            }
        }

        self.state = HotkeyState::Idle;
        Err(CyclerError::HotkeyUnavailable { combo, attempts })
    }

    /// Release the armed strategy. Returns once the OS registration is gone
    /// and no stale observation can be delivered.
    pub fn disarm(&mut self) -> Result<()> {
        let outcome = match self.armed.take() {
            Some((combo, index)) => {
                let strategy = &mut self.strategies[index];
                let kind = strategy.kind();
                match strategy.try_disarm() {
                    Ok(()) => {
                        info!(strategy = %kind, combo = %combo, "Hotkey disarmed");
                        Ok(())
                    }
                    Err(e) => {
                        warn!(strategy = %kind, combo = %combo, error = %e, "Strategy failed to release hotkey");
                        Err(CyclerError::Disarm(e))
                    }
                }
            }
            None => Ok(()),
        };

        if self.state != HotkeyState::Listening {
            self.state = HotkeyState::Idle;
        }
        while self.trigger_rx.try_recv().is_ok() {}
        self.debouncer.reset();
        outcome
    }

    /// Listen on every capable strategy at once and return the first combo
    /// any of them observes. `None` on timeout or cancellation.
    pub fn start_capture(&mut self, timeout: Duration, cancel: &CaptureCancel) -> Result<Option<HotkeyCombo>> {
        if self.armed.is_some() {
            return Err(CyclerError::Busy("a hotkey is armed".to_string()));
        }

        let (tx, rx) = sync_channel(hotkey::CAPTURE_CHANNEL_CAPACITY);
        let mut started = Vec::new();
        for (index, strategy) in self.strategies.iter_mut().enumerate() {
            let kind = strategy.kind();
            match strategy.try_capture(CaptureSink::new(tx.clone(), kind)) {
                Ok(()) => started.push(index),
                Err(e) => debug!(strategy = %kind, error = %e, "Strategy cannot capture"),
            }
        }
        drop(tx);

        if started.is_empty() {
            return Err(CyclerError::CaptureUnavailable);
        }
        self.state = HotkeyState::Listening;
        info!(strategies = started.len(), timeout_ms = timeout.as_millis() as u64, "Capturing hotkey");

        let deadline = Instant::now() + timeout;
        let tick = Duration::from_millis(hotkey::STOP_CHECK_INTERVAL_MS);
        let result = loop {
            if cancel.is_cancelled() {
                info!("Hotkey capture cancelled");
                break None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                info!("Hotkey capture timed out");
                break None;
            }
            match rx.recv_timeout(remaining.min(tick)) {
                Ok((kind, combo)) => {
                    info!(strategy = %kind, combo = %combo, "Hotkey captured");
                    break Some(combo);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break None,
            }
        };

        for index in started {
            self.strategies[index].stop_capture();
        }
        self.state = HotkeyState::Idle;
        Ok(result)
    }

    /// Wait up to `timeout` for the next debounced trigger.
    ///
    /// On success the state becomes `Triggered` until
    /// [`complete_trigger`](Self::complete_trigger) is called.
    pub fn recv_trigger(&mut self, timeout: Duration) -> Option<TriggerObservation> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let observation = match self.trigger_rx.recv_timeout(remaining) {
                Ok(observation) => observation,
                Err(_) => return None,
            };
            if self.state != HotkeyState::Armed {
                debug!(state = ?self.state, "Ignoring trigger outside armed state");
                continue;
            }
            if self.debouncer.accept(observation.at) {
                self.state = HotkeyState::Triggered;
                return Some(observation);
            }
            debug!(strategy = %observation.strategy, "Trigger coalesced");
        }
    }

    /// Return from `Triggered` to `Armed`
    pub fn complete_trigger(&mut self) {
        if self.state == HotkeyState::Triggered {
            self.state = HotkeyState::Armed;
        }
    }
}

impl Drop for HotkeyBackend {
    fn drop(&mut self) {
        if let Err(e) = self.disarm() {
            warn!(error = %e, "Failed to release hotkey on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::keys::{Key, MouseButton};
    use crate::hotkey::strategy::StrategyError;
    use crate::hotkey::strategy::testing::{FakeHandle, FakeStrategy};
    use std::thread;

    fn backend_with(
        hook: FakeStrategy,
        native: FakeStrategy,
        polling: FakeStrategy,
    ) -> HotkeyBackend {
        // Deliberately out of order: the backend sorts by priority
        HotkeyBackend::new(
            vec![Box::new(polling), Box::new(hook), Box::new(native)],
            Duration::from_millis(150),
        )
    }

    fn fakes() -> ((FakeStrategy, FakeHandle), (FakeStrategy, FakeHandle), (FakeStrategy, FakeHandle)) {
        (
            FakeStrategy::new(StrategyKind::Hook),
            FakeStrategy::new(StrategyKind::NativeRegistration),
            FakeStrategy::new(StrategyKind::Polling),
        )
    }

    #[test]
    fn test_strategies_sorted_by_priority() {
        let ((hook, _), (native, _), (polling, _)) = fakes();
        let backend = backend_with(hook, native, polling);
        assert_eq!(
            backend.strategy_kinds(),
            vec![StrategyKind::Hook, StrategyKind::NativeRegistration, StrategyKind::Polling]
        );
    }

    #[test]
    fn test_arm_uses_highest_priority_only() {
        let ((hook, hook_h), (native, native_h), (polling, polling_h)) = fakes();
        let mut backend = backend_with(hook, native, polling);
        let combo = HotkeyCombo::mouse(MouseButton::Side1);

        assert_eq!(backend.arm(combo).unwrap(), StrategyKind::Hook);
        assert_eq!(backend.state(), HotkeyState::Armed);
        assert_eq!(hook_h.armed(), Some(combo));
        assert_eq!(native_h.arm_attempts(), 0);
        assert_eq!(polling_h.arm_attempts(), 0);
    }

    #[test]
    fn test_hook_blocked_falls_back_to_native_and_fires() {
        let ((hook, hook_h), (native, native_h), (polling, polling_h)) = fakes();
        let hook = hook.failing(StrategyError::PermissionDenied("/dev/input".to_string()));
        let mut backend = backend_with(hook, native, polling);
        let combo: HotkeyCombo = "ctrl+f1".parse().unwrap();

        assert_eq!(backend.arm(combo).unwrap(), StrategyKind::NativeRegistration);
        assert_eq!(hook_h.arm_attempts(), 1);
        assert_eq!(polling_h.arm_attempts(), 0);
        assert_eq!(backend.active_strategy(), Some(StrategyKind::NativeRegistration));

        assert!(native_h.fire());
        let observation = backend.recv_trigger(Duration::from_secs(1)).unwrap();
        assert_eq!(observation.strategy, StrategyKind::NativeRegistration);
        assert_eq!(backend.state(), HotkeyState::Triggered);
        backend.complete_trigger();
        assert_eq!(backend.state(), HotkeyState::Armed);
    }

    #[test]
    fn test_all_strategies_failing_leaves_idle() {
        let ((hook, _), (native, _), (polling, _)) = fakes();
        let mut backend = backend_with(
            hook.failing(StrategyError::PermissionDenied("no input group".to_string())),
            native.failing(StrategyError::Conflict),
            polling.failing(StrategyError::Platform("no display".to_string())),
        );

        let err = backend.arm(HotkeyCombo::key(Key::F2)).unwrap_err();
        match err {
            CyclerError::HotkeyUnavailable { attempts, .. } => assert_eq!(attempts.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.state(), HotkeyState::Idle);
        assert_eq!(backend.armed_combo(), None);
    }

    #[test]
    fn test_unsupported_combo_skips_strategy() {
        let ((hook, _), (native, native_h), (polling, polling_h)) = fakes();
        let hook = hook.failing(StrategyError::PermissionDenied("blocked".to_string()));
        let mut backend = backend_with(hook, native.keyboard_only(), polling);

        let kind = backend.arm(HotkeyCombo::mouse(MouseButton::Middle)).unwrap();
        assert_eq!(kind, StrategyKind::Polling);
        assert_eq!(native_h.arm_attempts(), 0);
        assert!(polling_h.armed().is_some());
    }

    #[test]
    fn test_rearm_releases_previous_registration_first() {
        let ((hook, hook_h), (native, _), (polling, _)) = fakes();
        let mut backend = backend_with(hook, native, polling);

        backend.arm(HotkeyCombo::key(Key::F1)).unwrap();
        backend.arm(HotkeyCombo::key(Key::F2)).unwrap();
        assert_eq!(hook_h.disarms(), 1);
        assert_eq!(hook_h.armed(), Some(HotkeyCombo::key(Key::F2)));
    }

    #[test]
    fn test_disarm_is_synchronous_and_drops_pending_triggers() {
        let ((hook, hook_h), (native, _), (polling, _)) = fakes();
        let mut backend = backend_with(hook, native, polling);

        backend.arm(HotkeyCombo::key(Key::Tab)).unwrap();
        hook_h.fire();
        backend.disarm().unwrap();

        assert_eq!(backend.state(), HotkeyState::Idle);
        assert_eq!(hook_h.armed(), None);
        assert!(!hook_h.fire());
        assert!(backend.recv_trigger(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn test_duplicate_observations_coalesce() {
        let ((hook, hook_h), (native, _), (polling, _)) = fakes();
        let mut backend = backend_with(hook, native, polling);
        backend.arm(HotkeyCombo::mouse(MouseButton::Side2)).unwrap();

        hook_h.fire();
        hook_h.fire();
        assert!(backend.recv_trigger(Duration::from_secs(1)).is_some());
        backend.complete_trigger();
        assert!(backend.recv_trigger(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn test_capture_returns_first_combo_and_stops_all() {
        let ((hook, hook_h), (native, native_h), (polling, polling_h)) = fakes();
        let mut backend = backend_with(hook, native, polling);
        let combo: HotkeyCombo = "alt+mouse4".parse().unwrap();

        let presser = {
            let native_h = native_h.clone();
            thread::spawn(move || {
                while !native_h.is_capturing() {
                    thread::sleep(Duration::from_millis(2));
                }
                native_h.press_during_capture(combo);
            })
        };

        let captured = backend
            .start_capture(Duration::from_secs(5), &CaptureCancel::new())
            .unwrap();
        presser.join().unwrap();

        assert_eq!(captured, Some(combo));
        assert_eq!(backend.state(), HotkeyState::Idle);
        for handle in [&hook_h, &native_h, &polling_h] {
            assert_eq!(handle.capture_stops(), 1);
            assert!(!handle.is_capturing());
        }
    }

    #[test]
    fn test_capture_cancel_returns_none() {
        let ((hook, _), (native, _), (polling, _)) = fakes();
        let mut backend = backend_with(hook, native, polling);
        let cancel = CaptureCancel::new();

        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                cancel.cancel();
            })
        };

        let captured = backend.start_capture(Duration::from_secs(5), &cancel).unwrap();
        canceller.join().unwrap();
        assert_eq!(captured, None);
        assert_eq!(backend.state(), HotkeyState::Idle);
    }

    #[test]
    fn test_capture_times_out() {
        let ((hook, _), (native, _), (polling, _)) = fakes();
        let mut backend = backend_with(hook, native, polling);
        let captured = backend
            .start_capture(Duration::from_millis(40), &CaptureCancel::new())
            .unwrap();
        assert_eq!(captured, None);
    }

    #[test]
    fn test_capture_refused_while_armed() {
        let ((hook, _), (native, _), (polling, _)) = fakes();
        let mut backend = backend_with(hook, native, polling);
        backend.arm(HotkeyCombo::key(Key::F3)).unwrap();
        assert!(matches!(
            backend.start_capture(Duration::from_millis(10), &CaptureCancel::new()),
            Err(CyclerError::Busy(_))
        ));
    }
}
