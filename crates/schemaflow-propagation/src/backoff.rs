//! Exponential backoff with jitter
//!
//! `delay = min(max_delay, base_delay * multiplier^attempts) + U[0, max_jitter)`

use rand::Rng;
use std::time::Duration;

/// Retry delay policy for deferred propagation tasks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
            max_jitter: Duration::ZERO,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Capped exponential delay, without jitter
    #[must_use]
    pub fn base_delay_for(&self, attempts: u32) -> Duration {
        let cap = self.max_delay.as_secs_f64();
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= cap {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Delay including jitter drawn from `rng`
    #[must_use]
    pub fn delay_for<R: Rng>(&self, attempts: u32, rng: &mut R) -> Duration {
        let base = self.base_delay_for(attempts);
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rng.random_range(0..jitter_ms))
    }

    /// Delay including jitter from the thread-local RNG
    #[must_use]
    pub fn delay(&self, attempts: u32) -> Duration {
        self.delay_for(attempts, &mut rand::rng())
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 1.5,
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn grows_by_multiplier() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.base_delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay_for(1), Duration::from_millis(1500));
        assert_eq!(policy.base_delay_for(2), Duration::from_millis(2250));
    }

    #[test]
    fn caps_at_max_delay() {
        let policy = BackoffPolicy::default();

        // 1.5^9 ~= 38.4 > 30
        assert_eq!(policy.base_delay_for(9), Duration::from_secs(30));
        assert_eq!(policy.base_delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn no_jitter_is_deterministic() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), 2.0, Duration::from_secs(1));
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(policy.delay_for(3, &mut rng), Duration::from_millis(800));
    }

    #[test]
    fn seeded_jitter_is_reproducible() {
        let policy = BackoffPolicy::default();
        let a = policy.delay_for(2, &mut StdRng::seed_from_u64(42));
        let b = policy.delay_for(2, &mut StdRng::seed_from_u64(42));

        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_delay_within_bounds(attempts in 0u32..64, seed in any::<u64>()) {
            let policy = BackoffPolicy::default();
            let mut rng = StdRng::seed_from_u64(seed);
            let base = policy.base_delay_for(attempts);
            let delay = policy.delay_for(attempts, &mut rng);

            prop_assert!(base <= policy.max_delay);
            prop_assert!(delay >= base);
            prop_assert!(delay < base + policy.max_jitter);
        }

        #[test]
        fn prop_base_delay_monotonic(attempts in 0u32..63) {
            let policy = BackoffPolicy::default();
            prop_assert!(policy.base_delay_for(attempts) <= policy.base_delay_for(attempts + 1));
        }
    }
}
