use std::time::{Duration, Instant};

/// Pure reload timing: whether a reload may start now, and when the quiet
/// period after the last one ends. No I/O, no module access.
#[derive(Debug, Default, Clone)]
pub struct ReloadState {
    /// Reloading, including the quiet period that follows every reload.
    in_progress: bool,
    /// An invalidation arrived while reloading.
    pending_retrigger: bool,
    quiet_until: Option<Instant>,
}

impl ReloadState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an invalidation. Returns true when a reload should start now.
    pub fn on_invalidate(&mut self) -> bool {
        if self.in_progress {
            self.pending_retrigger = true;
            return false;
        }
        self.in_progress = true;
        true
    }

    /// A reload finished at `now`; nothing starts before `now + quiet`.
    pub fn on_reload_done(&mut self, now: Instant, quiet: Duration) {
        self.quiet_until = Some(now + quiet);
    }

    /// The quiet period ran out. Returns true when a coalesced reload is due,
    /// otherwise the state goes back to idle.
    pub fn on_quiet_elapsed(&mut self) -> bool {
        self.quiet_until = None;
        if self.pending_retrigger {
            self.pending_retrigger = false;
            return true;
        }
        self.in_progress = false;
        false
    }

    /// Time left in the quiet period, `None` when no timer is armed.
    pub fn timeout(&self, now: Instant) -> Option<Duration> {
        self.quiet_until
            .map(|until| until.saturating_duration_since(now))
    }

    pub fn is_idle(&self) -> bool {
        !self.in_progress
    }

    pub fn is_pending(&self) -> bool {
        self.pending_retrigger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(2000);

    #[test]
    fn test_idle_invalidation_reloads_immediately() {
        let mut state = ReloadState::new();
        assert!(state.is_idle());
        assert!(state.on_invalidate());
        assert!(!state.is_idle());
        assert_eq!(state.timeout(Instant::now()), None);
    }

    #[test]
    fn test_invalidation_while_reloading_is_coalesced() {
        let mut state = ReloadState::new();
        assert!(state.on_invalidate());
        let now = Instant::now();
        state.on_reload_done(now, QUIET);

        assert!(!state.on_invalidate());
        assert!(!state.on_invalidate());
        assert!(state.is_pending());
        assert_eq!(state.timeout(now), Some(QUIET));

        // one retrigger for both invalidations
        assert!(state.on_quiet_elapsed());
        assert!(!state.is_pending());
        assert!(!state.is_idle());
    }

    #[test]
    fn test_quiet_period_without_changes_goes_idle() {
        let mut state = ReloadState::new();
        state.on_invalidate();
        state.on_reload_done(Instant::now(), QUIET);

        assert!(!state.on_quiet_elapsed());
        assert!(state.is_idle());
        assert_eq!(state.timeout(Instant::now()), None);
    }

    #[test]
    fn test_timeout_saturates() {
        let mut state = ReloadState::new();
        state.on_invalidate();
        let start = Instant::now();
        state.on_reload_done(start, Duration::from_millis(10));
        let later = start + Duration::from_millis(50);
        assert_eq!(state.timeout(later), Some(Duration::ZERO));
    }

    #[test]
    fn test_retriggered_reload_arms_new_quiet_period() {
        let mut state = ReloadState::new();
        state.on_invalidate();
        let start = Instant::now();
        state.on_reload_done(start, QUIET);
        state.on_invalidate();
        assert!(state.on_quiet_elapsed());

        let second = start + QUIET;
        state.on_reload_done(second, QUIET);
        assert_eq!(state.timeout(second), Some(QUIET));
        assert!(!state.on_quiet_elapsed());
        assert!(state.is_idle());
    }
}
