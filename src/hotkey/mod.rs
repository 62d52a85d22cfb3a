//! Trigger combos and the redundant hotkey backend
//!
//! A [`HotkeyBackend`] owns one [`HotkeyStrategy`] per capture mechanism
//! (hook, native registration, polling), arms the highest-priority one that
//! accepts a combo and debounces what its listener threads report.

pub mod backend;
pub mod combo;
pub mod debounce;
pub mod keys;
pub mod strategy;

pub use backend::{CaptureCancel, HotkeyBackend, HotkeyState};
pub use combo::{HotkeyCombo, Modifiers, Trigger};
pub use debounce::Debouncer;
pub use keys::{Key, MouseButton};
pub use strategy::{
    CaptureSink, HotkeyStrategy, StrategyError, StrategyKind, TriggerObservation, TriggerSink,
};
