use std::time::{Duration, Instant};

/// Collapses trigger observations that arrive within a refractory window.
///
/// The window is measured from the last *accepted* observation, so a held
/// key that auto-repeats faster than the window produces one event per window
/// rather than a continuous stream.
#[derive(Debug, Clone)]
pub struct Debouncer {
    refractory: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub fn new(refractory: Duration) -> Self {
        Self {
            refractory,
            last_accepted: None,
        }
    }

    pub fn refractory(&self) -> Duration {
        self.refractory
    }

    pub fn set_refractory(&mut self, refractory: Duration) {
        self.refractory = refractory;
    }

    /// Returns true if an observation at `at` should be emitted
    pub fn accept(&mut self, at: Instant) -> bool {
        if let Some(last) = self.last_accepted
            && at.saturating_duration_since(last) < self.refractory
        {
            return false;
        }
        self.last_accepted = Some(at);
        true
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observations_within_window_collapse() {
        let mut debouncer = Debouncer::new(Duration::from_millis(150));
        let start = Instant::now();
        assert!(debouncer.accept(start));
        assert!(!debouncer.accept(start + Duration::from_millis(5)));
        assert!(!debouncer.accept(start + Duration::from_millis(149)));
        assert!(debouncer.accept(start + Duration::from_millis(150)));
    }

    #[test]
    fn test_window_measured_from_last_accepted() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let start = Instant::now();
        assert!(debouncer.accept(start));
        // Auto-repeat every 30ms
        let accepted = (1..=10)
            .filter(|i| debouncer.accept(start + Duration::from_millis(30 * i)))
            .count();
        // Only the repeats at 120ms and 240ms clear the window
        assert_eq!(accepted, 2);
    }

    #[test]
    fn test_zero_window_accepts_everything() {
        let mut debouncer = Debouncer::new(Duration::ZERO);
        let now = Instant::now();
        assert!(debouncer.accept(now));
        assert!(debouncer.accept(now));
    }

    #[test]
    fn test_reset_forgets_last_observation() {
        let mut debouncer = Debouncer::new(Duration::from_secs(10));
        let now = Instant::now();
        assert!(debouncer.accept(now));
        debouncer.reset();
        assert!(debouncer.accept(now));
    }
}
