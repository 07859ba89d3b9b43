//! Exponential backoff schedule
//!
//! The delay before retry `n` (0-based) is `base^n` seconds, optionally capped
//! and then spread by a uniform jitter of `±jitter_pct` percent.

use std::time::Duration;

use rand::RngExt;

/// Hard ceiling for any computed delay (one day), guards `Duration` overflow.
const MAX_DELAY_SECS: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: f64,
    cap: Option<Duration>,
    jitter_pct: u8,
}

impl Backoff {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            cap: None,
            jitter_pct: 0,
        }
    }

    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = Some(cap);
        self
    }

    /// Jitter percentage, clamped to 100.
    pub fn with_jitter(mut self, jitter_pct: u8) -> Self {
        self.jitter_pct = jitter_pct.min(100);
        self
    }

    /// Delay before retry `retry_count`, without jitter.
    ///
    /// Non-decreasing in `retry_count` for `base >= 1.0`.
    pub fn base_delay(&self, retry_count: u32) -> Duration {
        let exp = retry_count.min(i32::MAX as u32) as i32;
        let secs = self.base.powi(exp);
        let secs = if secs.is_finite() {
            secs.clamp(0.0, MAX_DELAY_SECS)
        } else {
            MAX_DELAY_SECS
        };
        let delay = Duration::from_secs_f64(secs);
        match self.cap {
            Some(cap) if delay > cap => cap,
            _ => delay,
        }
    }

    /// Delay before retry `retry_count`, with jitter applied.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let delay = self.base_delay(retry_count);
        if self.jitter_pct == 0 || delay.is_zero() {
            return delay;
        }
        let unit: f64 = rand::rng().random_range(0.0..1.0);
        apply_jitter(delay, self.jitter_pct, unit)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(2.0)
    }
}

/// Map `unit` in `[0, 1)` onto `[delay - pct%, delay + pct%]`.
fn apply_jitter(delay: Duration, jitter_pct: u8, unit: f64) -> Duration {
    let spread = f64::from(jitter_pct) / 100.0;
    let factor = 1.0 + spread * (2.0 * unit - 1.0);
    Duration::from_secs_f64((delay.as_secs_f64() * factor).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_two_doubles_from_one_second() {
        let backoff = Backoff::new(2.0);
        let delays: Vec<Duration> = (0..4).map(|n| backoff.base_delay(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
    }

    #[test]
    fn delays_never_decrease() {
        let backoff = Backoff::new(1.5);
        let mut previous = Duration::ZERO;
        for n in 0..40 {
            let d = backoff.base_delay(n);
            assert!(d >= previous, "delay {n} decreased: {d:?} < {previous:?}");
            previous = d;
        }
    }

    #[test]
    fn huge_exponent_is_clamped() {
        let backoff = Backoff::new(2.0);
        assert_eq!(backoff.base_delay(u32::MAX), Duration::from_secs(86_400));
    }

    #[test]
    fn cap_bounds_delay() {
        let backoff = Backoff::new(2.0).with_cap(Duration::from_secs(5));
        assert_eq!(backoff.base_delay(2), Duration::from_secs(4));
        assert_eq!(backoff.base_delay(3), Duration::from_secs(5));
    }

    #[test]
    fn without_jitter_delay_equals_base_delay() {
        let backoff = Backoff::new(2.0);
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let backoff = Backoff::new(2.0).with_jitter(20);
        for _ in 0..200 {
            let d = backoff.delay(2).as_secs_f64();
            assert!((3.2..=4.8).contains(&d), "jittered delay out of range: {d}");
        }
    }

    #[test]
    fn apply_jitter_extremes() {
        let delay = Duration::from_secs(10);
        assert_eq!(apply_jitter(delay, 50, 0.0), Duration::from_secs(5));
        assert_eq!(apply_jitter(delay, 50, 0.5), Duration::from_secs(10));
        assert_eq!(apply_jitter(delay, 100, 0.0), Duration::ZERO);
    }

    #[test]
    fn jitter_clamped_to_100() {
        let backoff = Backoff::new(2.0).with_jitter(250);
        assert_eq!(backoff, Backoff::new(2.0).with_jitter(100));
    }
}
