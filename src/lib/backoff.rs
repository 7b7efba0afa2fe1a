//! Exponential backoff with jitter for reconnect loops.

use std::time::Duration;
use std::time::Instant;

use rand::Rng;

/// Hands out reconnect delays that grow exponentially while failures keep coming.
///
/// Each delay is uniform in `[0, base * 2^exp)`. `exp` grows by one per call up to `max_exp`,
/// and resets once a call comes in more than `base * 2^(max_exp + 1)` after the previous one.
#[derive(Debug)]
pub struct ExponentialBackoff {
    base: Duration,
    exp: u32,
    max_exp: u32,
    reset_after: Duration,
    last_invocation: Option<Instant>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl ExponentialBackoff {
    pub fn new(base: Duration) -> Self {
        let max_exp = 10;
        Self {
            base,
            exp: 0,
            max_exp,
            reset_after: base * 2u32.pow(max_exp + 1),
            last_invocation: None,
        }
    }

    /// The next delay to wait before retrying.
    pub fn delay(&mut self) -> Duration {
        self.delay_at(Instant::now())
    }

    fn delay_at(&mut self, now: Instant) -> Duration {
        if let Some(last) = self.last_invocation {
            if now.saturating_duration_since(last) > self.reset_after {
                self.exp = 0;
            }
        }
        self.last_invocation = Some(now);

        self.exp = (self.exp + 1).min(self.max_exp);
        let ceiling = self.ceiling();
        rand::thread_rng().gen_range(Duration::ZERO..ceiling)
    }

    /// Upper bound of the current delay.
    fn ceiling(&self) -> Duration {
        self.base * 2u32.pow(self.exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stay_under_a_growing_ceiling() {
        let mut backoff = ExponentialBackoff::default();
        let now = Instant::now();

        for call in 1..=12u32 {
            let delay = backoff.delay_at(now);
            let exp = call.min(10);
            assert!(delay < Duration::from_secs(2u64.pow(exp)));
            assert_eq!(backoff.exp, exp);
        }
    }

    #[test]
    fn long_quiet_period_resets_exponent() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(10));
        let start = Instant::now();

        for _ in 0..5 {
            backoff.delay_at(start);
        }
        assert_eq!(backoff.exp, 5);

        // reset_after is 10ms * 2^11
        let later = start + Duration::from_millis(10 * 2048 + 1);
        backoff.delay_at(later);
        assert_eq!(backoff.exp, 1);
    }
}
