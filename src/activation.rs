//! Forcing a window to the foreground
//!
//! Focus-stealing prevention means a plain "activate" request is often
//! ignored. [`WindowActivator`] escalates through four techniques and stops
//! at the first one after which the target really is the foreground window.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::platform::{FocusControl, PlatformError};
use crate::registry::WindowRegistry;
use crate::types::{GameWindow, WindowHandle, WindowId};

/// Ladder steps, in escalation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LadderStep {
    Foreground,
    AttachedInput,
    ModifierBypass,
    SyntheticClick,
}

impl std::fmt::Display for LadderStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Foreground => "foreground request",
            Self::AttachedInput => "attached input",
            Self::ModifierBypass => "modifier bypass",
            Self::SyntheticClick => "synthetic click",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    #[error("window {0} is no longer valid")]
    Invalid(WindowId),

    #[error("window {window} could not be brought to the foreground ({})", attempts.join("; "))]
    Exhausted { window: WindowId, attempts: Vec<String> },
}

/// Detaches input on drop, so every exit path of the attach step detaches
struct InputAttachment<'a> {
    focus: &'a dyn FocusControl,
    handle: WindowHandle,
}

impl Drop for InputAttachment<'_> {
    fn drop(&mut self) {
        self.focus.detach_input(self.handle);
    }
}

/// Releases the neutral modifier on drop
struct HeldModifier<'a> {
    focus: &'a dyn FocusControl,
}

impl Drop for HeldModifier<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.focus.set_neutral_modifier(false) {
            warn!(error = %e, "Failed to release neutral modifier");
        }
    }
}

pub struct WindowActivator {
    focus: Arc<dyn FocusControl>,
    settle: Duration,
}

impl WindowActivator {
    pub fn new(focus: Arc<dyn FocusControl>, settle: Duration) -> Self {
        Self { focus, settle }
    }

    pub fn set_settle(&mut self, settle: Duration) {
        self.settle = settle;
    }

    fn settled_on(&self, handle: WindowHandle) -> bool {
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        self.focus.foreground_window() == Some(handle)
    }

    /// Bring `window` to the foreground.
    ///
    /// Fails fast with [`ActivationError::Invalid`] when the registry no
    /// longer considers the window live. Never panics or aborts: a failure
    /// only concerns this window.
    pub fn activate(&self, registry: &WindowRegistry, window: &GameWindow) -> Result<LadderStep, ActivationError> {
        if !registry.is_valid(window.id) {
            return Err(ActivationError::Invalid(window.id));
        }

        let focus = self.focus.as_ref();
        let handle = window.handle;
        let mut attempts = Vec::new();
        let mut note = |step: LadderStep, e: PlatformError| {
            debug!(window = %handle, step = %step, error = %e, "Ladder step failed");
            attempts.push(format!("{step}: {e}"));
        };

        // 1. Plain request, restoring first if minimized
        let minimized = focus.is_minimized(handle).unwrap_or(window.minimized);
        if minimized && let Err(e) = focus.restore(handle) {
            warn!(window = %handle, error = %e, "Failed to restore minimized window");
        }
        match focus.request_foreground(handle) {
            Ok(()) if self.settled_on(handle) => return Ok(self.succeeded(window, LadderStep::Foreground)),
            Ok(()) => {}
            Err(e) => note(LadderStep::Foreground, e),
        }

        // 2. Share the target thread's input state for the retry
        match focus.attach_input(handle) {
            Ok(attached) => {
                let _attachment = attached.then(|| InputAttachment { focus, handle });
                match focus.request_foreground(handle) {
                    Ok(()) if self.settled_on(handle) => {
                        return Ok(self.succeeded(window, LadderStep::AttachedInput));
                    }
                    Ok(()) => {}
                    Err(e) => note(LadderStep::AttachedInput, e),
                }
            }
            Err(e) => note(LadderStep::AttachedInput, e),
        }

        // 3. Hold a neutral modifier around the request
        match focus.set_neutral_modifier(true) {
            Ok(()) => {
                let outcome = {
                    let _held = HeldModifier { focus };
                    focus.request_foreground(handle)
                };
                match outcome {
                    Ok(()) if self.settled_on(handle) => {
                        return Ok(self.succeeded(window, LadderStep::ModifierBypass));
                    }
                    Ok(()) => {}
                    Err(e) => note(LadderStep::ModifierBypass, e),
                }
            }
            Err(e) => note(LadderStep::ModifierBypass, e),
        }

        // 4. Click where the window is
        match focus
            .window_center(handle)
            .and_then(|(x, y)| focus.click_at(x, y))
        {
            Ok(()) if self.settled_on(handle) => return Ok(self.succeeded(window, LadderStep::SyntheticClick)),
            Ok(()) => {}
            Err(e) => note(LadderStep::SyntheticClick, e),
        }

        warn!(window = %handle, character = %window.character_name, "Activation ladder exhausted");
        Err(ActivationError::Exhausted {
            window: window.id,
            attempts,
        })
    }

    fn succeeded(&self, window: &GameWindow, step: LadderStep) -> LadderStep {
        info!(window = %window.handle, character = %window.character_name, step = %step, "Window activated");
        step
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeFocus;
    use super::*;
    use crate::registry::testing::{FakeSource, game_window};

    fn setup(handles: &[u64]) -> (Arc<FakeSource>, WindowRegistry, Arc<FakeFocus>, WindowActivator) {
        let windows = handles
            .iter()
            .map(|h| game_window(*h, &format!("Char{h} - Dofus 2.71")))
            .collect();
        let source = FakeSource::with_windows(windows);
        let registry = WindowRegistry::new(source.clone());
        registry.refresh();
        let focus = FakeFocus::new();
        let activator = WindowActivator::new(focus.clone(), Duration::ZERO);
        (source, registry, focus, activator)
    }

    fn window(registry: &WindowRegistry, handle: u64) -> GameWindow {
        registry.snapshot().by_handle(WindowHandle(handle)).unwrap().clone()
    }

    #[test]
    fn test_cooperative_window_needs_first_step_only() {
        let (_, registry, focus, activator) = setup(&[1]);
        let step = activator.activate(&registry, &window(&registry, 1)).unwrap();
        assert_eq!(step, LadderStep::Foreground);
        assert_eq!(focus.log(), vec!["foreground 0x1"]);
    }

    #[test]
    fn test_minimized_window_is_restored_first() {
        let (_, registry, focus, activator) = setup(&[1]);
        focus.minimize(1);
        let step = activator.activate(&registry, &window(&registry, 1)).unwrap();
        assert_eq!(step, LadderStep::Foreground);
        assert_eq!(focus.log()[0], "restore 0x1");
    }

    #[test]
    fn test_attach_step_always_detaches() {
        let (_, registry, focus, activator) = setup(&[1]);
        focus.resist_until(1, LadderStep::AttachedInput);
        let step = activator.activate(&registry, &window(&registry, 1)).unwrap();
        assert_eq!(step, LadderStep::AttachedInput);
        assert_eq!(
            focus.log(),
            vec!["foreground 0x1", "attach 0x1", "foreground 0x1", "detach 0x1"]
        );
    }

    #[test]
    fn test_modifier_bypass_releases_modifier() {
        let (_, registry, focus, activator) = setup(&[1]);
        focus.resist_until(1, LadderStep::ModifierBypass);
        let step = activator.activate(&registry, &window(&registry, 1)).unwrap();
        assert_eq!(step, LadderStep::ModifierBypass);
        let log = focus.log();
        assert_eq!(&log[log.len() - 3..], ["modifier down", "foreground 0x1", "modifier up"]);
    }

    #[test]
    fn test_click_is_last_resort() {
        let (_, registry, focus, activator) = setup(&[1]);
        focus.resist_until(1, LadderStep::SyntheticClick);
        let step = activator.activate(&registry, &window(&registry, 1)).unwrap();
        assert_eq!(step, LadderStep::SyntheticClick);
        assert_eq!(focus.log().last().unwrap(), "click 400,300");
    }

    #[test]
    fn test_exhausted_ladder_is_an_error() {
        let (_, registry, focus, activator) = setup(&[1]);
        focus.make_unreachable(1);
        let target = window(&registry, 1);
        let err = activator.activate(&registry, &target).unwrap_err();
        assert!(matches!(err, ActivationError::Exhausted { window, .. } if window == target.id));
        assert_eq!(focus.foreground(), None);
    }

    #[test]
    fn test_stale_window_fails_fast() {
        let (source, registry, focus, activator) = setup(&[1]);
        let target = window(&registry, 1);
        source.close(1);
        assert_eq!(
            activator.activate(&registry, &target),
            Err(ActivationError::Invalid(target.id))
        );
        assert!(focus.log().is_empty());
    }
}
