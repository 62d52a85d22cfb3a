//! Capability interface shared by the hotkey strategies
//!
//! Strategies own their listener threads and hand observations to the
//! backend through bounded channels. A listener never blocks: if the channel
//! is full the observation is dropped, which the debouncer would have
//! collapsed anyway.

use std::fmt;
use std::sync::mpsc::{SyncSender, TrySendError};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, trace};

use super::combo::HotkeyCombo;

/// Strategy family, ordered by priority (highest first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StrategyKind {
    /// Global low-level keyboard/mouse hook
    Hook,
    /// OS exclusive hotkey registration
    NativeRegistration,
    /// Input-state polling fallback
    Polling,
}

impl StrategyKind {
    /// Lower value is tried first
    pub fn priority(self) -> u8 {
        match self {
            Self::Hook => 0,
            Self::NativeRegistration => 1,
            Self::Polling => 2,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Hook => "hook",
            Self::NativeRegistration => "native registration",
            Self::Polling => "polling",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("combination is already registered by another application")]
    Conflict,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Platform(String),
}

/// One raw trigger observation
#[derive(Debug, Clone, Copy)]
pub struct TriggerObservation {
    pub strategy: StrategyKind,
    pub at: Instant,
}

/// Sending half handed to an armed strategy
#[derive(Clone)]
pub struct TriggerSink {
    tx: SyncSender<TriggerObservation>,
    kind: StrategyKind,
}

impl TriggerSink {
    pub fn new(tx: SyncSender<TriggerObservation>, kind: StrategyKind) -> Self {
        Self { tx, kind }
    }

    /// Report a trigger press. Never blocks.
    pub fn fire(&self) {
        let observation = TriggerObservation {
            strategy: self.kind,
            at: Instant::now(),
        };
        match self.tx.try_send(observation) {
            Ok(()) => trace!(strategy = %self.kind, "Trigger observed"),
            Err(TrySendError::Full(_)) => debug!(strategy = %self.kind, "Trigger channel full, dropping observation"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Sending half handed to a capturing strategy
#[derive(Clone)]
pub struct CaptureSink {
    tx: SyncSender<(StrategyKind, HotkeyCombo)>,
    kind: StrategyKind,
}

impl CaptureSink {
    pub fn new(tx: SyncSender<(StrategyKind, HotkeyCombo)>, kind: StrategyKind) -> Self {
        Self { tx, kind }
    }

    /// Offer a detected combination. Never blocks.
    pub fn offer(&self, combo: HotkeyCombo) {
        if self.tx.try_send((self.kind, combo)).is_ok() {
            debug!(strategy = %self.kind, combo = %combo, "Capture candidate");
        }
    }
}

/// One way of observing a global trigger.
///
/// `try_disarm` and `stop_capture` must not return before the strategy has
/// released every OS registration and stopped reporting.
pub trait HotkeyStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Whether this strategy can observe `combo` at all
    fn supports(&self, combo: &HotkeyCombo) -> bool {
        let _ = combo;
        true
    }

    fn try_arm(&mut self, combo: HotkeyCombo, sink: TriggerSink) -> Result<(), StrategyError>;

    fn try_disarm(&mut self) -> Result<(), StrategyError>;

    fn try_capture(&mut self, sink: CaptureSink) -> Result<(), StrategyError>;

    fn stop_capture(&mut self);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub struct FakeShared {
        pub armed: Option<HotkeyCombo>,
        pub sink: Option<TriggerSink>,
        pub capture_sink: Option<CaptureSink>,
        pub arm_attempts: usize,
        pub disarms: usize,
        pub capture_stops: usize,
    }

    /// Scriptable strategy driven from tests through a [`FakeHandle`]
    pub struct FakeStrategy {
        kind: StrategyKind,
        arm_error: Option<StrategyError>,
        capture_error: Option<StrategyError>,
        unsupported_mouse: bool,
        shared: Arc<Mutex<FakeShared>>,
    }

    #[derive(Clone)]
    pub struct FakeHandle(Arc<Mutex<FakeShared>>);

    impl FakeStrategy {
        pub fn new(kind: StrategyKind) -> (Self, FakeHandle) {
            let shared = Arc::new(Mutex::new(FakeShared::default()));
            let strategy = Self {
                kind,
                arm_error: None,
                capture_error: None,
                unsupported_mouse: false,
                shared: shared.clone(),
            };
            (strategy, FakeHandle(shared))
        }

        pub fn failing(mut self, error: StrategyError) -> Self {
            self.arm_error = Some(error.clone());
            self.capture_error = Some(error);
            self
        }

        pub fn keyboard_only(mut self) -> Self {
            self.unsupported_mouse = true;
            self
        }
    }

    impl HotkeyStrategy for FakeStrategy {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn supports(&self, combo: &HotkeyCombo) -> bool {
            !(self.unsupported_mouse && combo.trigger.is_mouse())
        }

        fn try_arm(&mut self, combo: HotkeyCombo, sink: TriggerSink) -> Result<(), StrategyError> {
            let mut shared = self.shared.lock().unwrap();
            shared.arm_attempts += 1;
            if let Some(error) = &self.arm_error {
                return Err(error.clone());
            }
            shared.armed = Some(combo);
            shared.sink = Some(sink);
            Ok(())
        }

        fn try_disarm(&mut self) -> Result<(), StrategyError> {
            let mut shared = self.shared.lock().unwrap();
            if shared.armed.take().is_some() {
                shared.disarms += 1;
            }
            shared.sink = None;
            Ok(())
        }

        fn try_capture(&mut self, sink: CaptureSink) -> Result<(), StrategyError> {
            if let Some(error) = &self.capture_error {
                return Err(error.clone());
            }
            self.shared.lock().unwrap().capture_sink = Some(sink);
            Ok(())
        }

        fn stop_capture(&mut self) {
            let mut shared = self.shared.lock().unwrap();
            if shared.capture_sink.take().is_some() {
                shared.capture_stops += 1;
            }
        }
    }

    impl FakeHandle {
        /// Simulate the OS reporting a trigger press; false when not armed
        pub fn fire(&self) -> bool {
            match &self.0.lock().unwrap().sink {
                Some(sink) => {
                    sink.fire();
                    true
                }
                None => false,
            }
        }

        /// Simulate the user pressing `combo` while capturing
        pub fn press_during_capture(&self, combo: HotkeyCombo) -> bool {
            match &self.0.lock().unwrap().capture_sink {
                Some(sink) => {
                    sink.offer(combo);
                    true
                }
                None => false,
            }
        }

        pub fn is_capturing(&self) -> bool {
            self.0.lock().unwrap().capture_sink.is_some()
        }

        pub fn armed(&self) -> Option<HotkeyCombo> {
            self.0.lock().unwrap().armed
        }

        pub fn arm_attempts(&self) -> usize {
            self.0.lock().unwrap().arm_attempts
        }

        pub fn disarms(&self) -> usize {
            self.0.lock().unwrap().disarms
        }

        pub fn capture_stops(&self) -> usize {
            self.0.lock().unwrap().capture_stops
        }
    }
}
