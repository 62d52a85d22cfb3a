//! Polling fallback: samples `GetAsyncKeyState`

use std::thread;
use std::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use super::{held_modifiers, key_down};
use crate::constants::hotkey;
use crate::hotkey::{CaptureSink, HotkeyCombo, HotkeyStrategy, Key, MouseButton, StrategyError, StrategyKind, Trigger, TriggerSink};
use crate::platform::Listener;

fn trigger_vk(trigger: Trigger) -> u16 {
    match trigger {
        Trigger::Key(key) => key.spec().vk,
        Trigger::Mouse(button) => button.vk(),
    }
}

fn every_interval(stop: &AtomicBool, mut tick: impl FnMut()) {
    let interval = Duration::from_millis(hotkey::POLL_INTERVAL_MS);
    while !stop.load(Ordering::SeqCst) {
        tick();
        thread::sleep(interval);
    }
}

#[derive(Default)]
pub struct AsyncKeyPoll {
    armed: Option<Listener>,
    capture: Option<Listener>,
}

impl AsyncKeyPoll {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HotkeyStrategy for AsyncKeyPoll {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Polling
    }

    fn try_arm(&mut self, combo: HotkeyCombo, sink: TriggerSink) -> Result<(), StrategyError> {
        self.try_disarm()?;
        let vk = trigger_vk(combo.trigger);
        self.armed = Some(Listener::spawn("key-poll", move |stop| {
            // Held at arm time counts as already down
            let mut was_down = true;
            every_interval(&stop, || {
                let down = key_down(vk);
                if down && !was_down && held_modifiers() == combo.modifiers {
                    sink.fire();
                }
                was_down = down;
            });
        })?);
        info!(combo = %combo, "Polling for hotkey");
        Ok(())
    }

    fn try_disarm(&mut self) -> Result<(), StrategyError> {
        if let Some(mut listener) = self.armed.take() {
            listener.stop();
        }
        Ok(())
    }

    fn try_capture(&mut self, sink: CaptureSink) -> Result<(), StrategyError> {
        self.stop_capture();
        let candidates: Vec<Trigger> = Key::ALL
            .iter()
            .map(|&key| Trigger::Key(key))
            .chain(MouseButton::ALL.iter().map(|&button| Trigger::Mouse(button)))
            .collect();
        self.capture = Some(Listener::spawn("key-poll-capture", move |stop| {
            let mut was_down: Vec<bool> = candidates.iter().map(|&t| key_down(trigger_vk(t))).collect();
            every_interval(&stop, || {
                for (trigger, was) in candidates.iter().zip(was_down.iter_mut()) {
                    let down = key_down(trigger_vk(*trigger));
                    if down && !*was {
                        sink.offer(HotkeyCombo::new(*trigger, held_modifiers()));
                    }
                    *was = down;
                }
            });
        })?);
        Ok(())
    }

    fn stop_capture(&mut self) {
        if let Some(mut listener) = self.capture.take() {
            listener.stop();
        }
    }
}
