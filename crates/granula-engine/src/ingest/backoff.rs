//! Capped exponential backoff

use std::time::Duration;

/// Retry delay policy: `min(base * 2^(attempt - 1), max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (1-based)
    ///
    /// Non-decreasing in `attempt` and never above `max`. Attempt 0 is treated
    /// as attempt 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_doubles_until_cap() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30));
        let delays: Vec<u64> = (1..=7).map(|n| policy.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_huge_attempt_counts_saturate() {
        let policy = BackoffPolicy::new(Duration::from_millis(250), Duration::from_secs(5));
        assert_eq!(policy.delay(40), Duration::from_secs(5));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(5));
        assert_eq!(policy.delay(0), Duration::from_millis(250));
    }

    proptest! {
        #[test]
        fn prop_delay_monotonic_and_capped(
            base_ms in 1u64..5_000,
            max_ms in 1u64..120_000,
            attempt in 1u32..80,
        ) {
            let policy = BackoffPolicy::new(
                Duration::from_millis(base_ms),
                Duration::from_millis(max_ms),
            );
            prop_assert!(policy.delay(attempt) <= policy.delay(attempt + 1));
            prop_assert!(policy.delay(attempt) <= policy.max);
        }
    }
}
