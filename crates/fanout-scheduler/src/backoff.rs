use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Longest delay ever handed to the retry timer. `DelayQueue` rejects
/// deadlines past roughly two years.
pub const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Capped exponential backoff: `base * 2^(attempts - 1)`, never above `ceiling`
/// or [`MAX_DELAY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    pub base: Duration,
    pub ceiling: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            ceiling: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self { base, ceiling }
    }

    /// Delay before the task becomes ready again after its `attempts`-th attempt failed.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempts.saturating_sub(1));
        self.base
            .saturating_mul(exp)
            .min(self.ceiling)
            .min(MAX_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(60));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn capped_at_ceiling() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(backoff.delay_for(4), Duration::from_secs(5));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn huge_ceiling_is_clamped() {
        let backoff = Backoff::new(Duration::from_secs(100_000_000), Duration::MAX);
        assert_eq!(backoff.delay_for(1), MAX_DELAY);
        assert_eq!(backoff.delay_for(40), MAX_DELAY);
    }

    #[test]
    fn zero_base_never_waits() {
        let backoff = Backoff::new(Duration::ZERO, Duration::from_secs(5));
        assert!(backoff.delay_for(7).is_zero());
    }
}
