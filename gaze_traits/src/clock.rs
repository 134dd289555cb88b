use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source shared by the sampling, sweep and animation loops.
///
/// - now(): monotonic Instant
/// - sleep(): block for `d` (test clocks advance instead)
/// - secs_since(): elapsed seconds as f32, used by the gaze state machines
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_millis() as u64
    }

    /// Seconds elapsed since `epoch` as f32, saturating at 0.
    fn secs_since(&self, epoch: Instant) -> f32 {
        self.now().saturating_duration_since(epoch).as_secs_f32()
    }
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, d: Duration) {
        (**self).sleep(d)
    }
}

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod test_clock {
    use super::*;

    /// Deterministic clock for tests: `now() = origin + offset`, and `sleep(d)`
    /// advances the offset instead of blocking. Clones share the same offset.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        offset: std::sync::Arc<std::sync::Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: std::sync::Arc::new(std::sync::Mutex::new(Duration::ZERO)),
            }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        /// Elapsed simulated time since construction.
        pub fn elapsed(&self) -> Duration {
            self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            let off = self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO);
            self.origin + off
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_clock::TestClock;
    use super::*;

    #[test]
    fn test_clock_sleep_advances_without_blocking() {
        let clock = TestClock::new();
        let t0 = clock.now();
        let wall = Instant::now();
        clock.sleep(Duration::from_secs(5));
        assert!(wall.elapsed() < Duration::from_secs(1));
        assert_eq!(clock.ms_since(t0), 5_000);
        assert!((clock.secs_since(t0) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_clock_clones_share_time() {
        let a = TestClock::new();
        let b = a.clone();
        a.advance(Duration::from_millis(250));
        assert_eq!(b.elapsed(), Duration::from_millis(250));
    }
}
