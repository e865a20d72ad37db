//! Quiescence gate for interactive recomputation.
//!
//! Every viewport change calls [`Debouncer::note_change`]; the caller
//! recomputes only once [`Debouncer::ready`] reports the quiet period has
//! passed. Time is passed in so tests can drive it.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    last_change: Option<Instant>,
}

impl Debouncer {
    #[must_use]
    pub const fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_change: None,
        }
    }

    #[must_use]
    pub const fn from_millis(quiet_ms: u64) -> Self {
        Self::new(Duration::from_millis(quiet_ms))
    }

    #[must_use]
    pub const fn quiet(&self) -> Duration {
        self.quiet
    }

    pub fn note_change(&mut self, now: Instant) {
        self.last_change = Some(now);
    }

    /// A change is waiting for the quiet period to end.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.last_change.is_some()
    }

    /// True once, when a pending change has been quiet for long enough.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last_change {
            Some(at) if now.saturating_duration_since(at) >= self.quiet => {
                self.last_change = None;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending change.
    pub fn reset(&mut self) {
        self.last_change = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_quiet_period() {
        let mut d = Debouncer::from_millis(120);
        let t0 = Instant::now();
        assert!(!d.ready(t0));

        d.note_change(t0);
        assert!(!d.ready(t0 + Duration::from_millis(50)));
        assert!(d.ready(t0 + Duration::from_millis(120)));
        assert!(!d.ready(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn new_changes_restart_the_clock() {
        let mut d = Debouncer::from_millis(120);
        let t0 = Instant::now();
        d.note_change(t0);
        d.note_change(t0 + Duration::from_millis(100));
        assert!(!d.ready(t0 + Duration::from_millis(150)));
        assert!(d.is_pending());
        assert!(d.ready(t0 + Duration::from_millis(220)));
    }

    #[test]
    fn reset_clears_pending_change() {
        let mut d = Debouncer::from_millis(10);
        let t0 = Instant::now();
        d.note_change(t0);
        d.reset();
        assert!(!d.ready(t0 + Duration::from_secs(1)));
    }
}
