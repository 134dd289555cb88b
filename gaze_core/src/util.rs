//! Common time/period helpers for gaze_core.

use std::time::Duration;

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Compute the period in microseconds for a given sampling rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 microsecond.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Seconds (possibly fractional, possibly garbage) to a `Duration`.
/// Non-finite or negative input maps to zero.
#[inline]
pub fn secs(s: f32) -> Duration {
    if s.is_finite() && s > 0.0 {
        Duration::from_secs_f32(s)
    } else {
        Duration::ZERO
    }
}

/// Uniform draw from `[lo, hi]`. A degenerate, inverted or non-finite
/// range yields `lo` (or 0 when `lo` itself is not finite).
#[inline]
pub fn uniform<R: rand::Rng + ?Sized>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    if !lo.is_finite() {
        0.0
    } else if !hi.is_finite() {
        lo
    } else if lo < hi {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

/// Bernoulli draw; `p` outside [0, 1] (or NaN) is clamped.
#[inline]
pub fn chance<R: rand::Rng + ?Sized>(rng: &mut R, p: f32) -> bool {
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
    rng.gen_bool(f64::from(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn periods_never_divide_by_zero() {
        assert_eq!(period_us(0), MICROS_PER_SEC);
        assert_eq!(period_us(20), 50_000);
        assert_eq!(period_us(2_000_000), 1);
    }

    #[test]
    fn secs_rejects_garbage() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f32::NAN), Duration::ZERO);
        assert_eq!(secs(0.25), Duration::from_millis(250));
    }

    #[test]
    fn draws_handle_degenerate_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(uniform(&mut rng, 3.0, 3.0), 3.0);
        assert_eq!(uniform(&mut rng, 5.0, 1.0), 5.0);
        assert_eq!(uniform(&mut rng, 0.5, f32::INFINITY), 0.5);
        assert_eq!(uniform(&mut rng, f32::NEG_INFINITY, 1.0), 0.0);
        assert_eq!(uniform(&mut rng, 0.5, f32::NAN), 0.5);
        let x = uniform(&mut rng, 1.0, 2.0);
        assert!((1.0..=2.0).contains(&x));
        assert!(!chance(&mut rng, -1.0));
        assert!(chance(&mut rng, 2.0));
        assert!(!chance(&mut rng, f32::NAN));
    }
}
