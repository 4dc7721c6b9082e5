//! Retry policy for remote config fetches.

use std::env;
use std::time::Duration;

use rand::Rng;

/// Jittered linear backoff.
///
/// The delay before retry `n` (zero-based) is
/// `base + n * increment + uniform(0..=jitter)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Added per previous retry.
    pub increment: Duration,
    /// Upper bound of the random component.
    pub jitter: Duration,
    /// Maximum number of retries (None = retry forever).
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            increment: Duration::from_secs(10),
            jitter: Duration::from_secs(5),
            max_attempts: Some(20),
        }
    }
}

impl RetryPolicy {
    /// Load the policy from environment variables, falling back to defaults.
    ///
    /// - `PUSH_PARAMS_RETRY_BASE_SECS`
    /// - `PUSH_PARAMS_RETRY_STEP_SECS`
    /// - `PUSH_PARAMS_RETRY_MAX` (`0` means unbounded)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |key: &str, fallback: Duration| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        let max_attempts = match env::var("PUSH_PARAMS_RETRY_MAX")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            Some(0) => None,
            Some(max) => Some(max),
            None => defaults.max_attempts,
        };

        Self {
            base: secs("PUSH_PARAMS_RETRY_BASE_SECS", defaults.base),
            increment: secs("PUSH_PARAMS_RETRY_STEP_SECS", defaults.increment),
            jitter: defaults.jitter,
            max_attempts,
        }
    }

    /// A policy with no random component, for deterministic tests.
    pub fn fixed(base: Duration, increment: Duration) -> Self {
        Self {
            base,
            increment,
            jitter: Duration::ZERO,
            max_attempts: None,
        }
    }

    /// Set the retry ceiling.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before the given retry (zero-based), without jitter.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base + self.increment.saturating_mul(attempt)
    }

    /// Delay before the given retry (zero-based), with jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.base_delay_for_attempt(attempt) + jitter
    }

    /// Check if we should retry after the given number of attempts.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_growth() {
        let policy = RetryPolicy::fixed(Duration::from_secs(30), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(40));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(80));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..10 {
            let delay = policy.delay_for_attempt(attempt);
            let floor = policy.base_delay_for_attempt(attempt);
            assert!(delay >= floor);
            assert!(delay <= floor + policy.jitter);
        }
    }

    #[test]
    fn test_should_retry() {
        let bounded = RetryPolicy::default().with_max_attempts(Some(3));
        assert!(bounded.should_retry(0));
        assert!(bounded.should_retry(2));
        assert!(!bounded.should_retry(3));

        let unbounded = bounded.with_max_attempts(None);
        assert!(unbounded.should_retry(u32::MAX - 1));
    }
}
