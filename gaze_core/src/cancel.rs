//! Cooperative cancellation shared by every periodic task.
//!
//! Tasks check `is_cancelled()` once per iteration; nothing is interrupted
//! mid-write, so stop latency is bounded by the longest single sleep.

use gaze_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    ancestors: Vec<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is cancelled when either it or `self` is cancelled.
    /// Cancelling the child does not affect the parent.
    pub fn child(&self) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.flag.clone());
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            ancestors,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.ancestors.iter().any(|a| a.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        !self.is_cancelled()
    }
}

/// Longest uninterrupted slice of a cancellable sleep.
pub const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Sleep for `d` in slices, returning early (with `false`) once `token` is
/// cancelled. Returns `true` when the full duration elapsed.
pub fn sleep_unless_cancelled<C: Clock + ?Sized>(clock: &C, d: Duration, token: &CancelToken) -> bool {
    let mut left = d;
    while !left.is_zero() {
        if token.is_cancelled() {
            return false;
        }
        let slice = left.min(SLEEP_SLICE);
        clock.sleep(slice);
        left -= slice;
    }
    token.is_running()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaze_traits::clock::test_clock::TestClock;

    #[test]
    fn cancellable_sleep_runs_to_completion_or_stops_early() {
        let clock = TestClock::new();
        let token = CancelToken::new();
        assert!(sleep_unless_cancelled(&clock, Duration::from_millis(120), &token));
        assert_eq!(clock.elapsed(), Duration::from_millis(120));

        token.cancel();
        assert!(!sleep_unless_cancelled(&clock, Duration::from_secs(10), &token));
        assert_eq!(clock.elapsed(), Duration::from_millis(120));
    }

    #[test]
    fn parent_cancels_children_but_not_the_reverse() {
        let root = CancelToken::new();
        let mode = root.child();
        let task = mode.child();
        assert!(task.is_running());

        task.cancel();
        assert!(task.is_cancelled());
        assert!(mode.is_running());

        let other = mode.child();
        root.cancel();
        assert!(mode.is_cancelled());
        assert!(other.is_cancelled());
    }
}
