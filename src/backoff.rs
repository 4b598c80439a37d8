//! Poll delay with exponential backoff and jitter on repeated failures.
//!
//! A healthy loop sleeps exactly the poll interval. After consecutive failed
//! cycles the delay doubles per failure, with 0.5x-1.5x jitter, and is capped
//! at the configured maximum. With the maximum equal to the interval the
//! delay never changes.

use std::time::Duration;

use rand::Rng;

/// Configuration for the delay between reconciliation cycles
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Delay after a successful cycle
    pub interval: Duration,
    /// Maximum delay after repeated failures
    pub max_delay: Duration,
    /// Multiplier applied per consecutive failure
    pub backoff_multiplier: f64,
}

impl BackoffConfig {
    /// Fixed interval growing up to `max_delay` on failures
    pub fn new(interval: Duration, max_delay: Duration) -> Self {
        Self {
            interval,
            max_delay: max_delay.max(interval),
            backoff_multiplier: 2.0,
        }
    }
}

/// Tracks consecutive failures and computes the next sleep
#[derive(Clone, Debug)]
pub struct PollBackoff {
    config: BackoffConfig,
    consecutive_failures: u32,
}

impl PollBackoff {
    /// Start with no recorded failures
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
        }
    }

    /// Reset after a successful cycle
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count a failed cycle
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Failed cycles since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay before the next cycle
    pub fn next_delay(&self) -> Duration {
        let interval = self.config.interval;
        let max = self.config.max_delay;
        if self.consecutive_failures == 0 || max <= interval {
            return interval;
        }

        let exponent = self.consecutive_failures.min(32) as i32;
        let grown = interval.as_secs_f64() * self.config.backoff_multiplier.powi(exponent);
        let capped = grown.min(max.as_secs_f64());

        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered = (capped * jitter).clamp(interval.as_secs_f64(), max.as_secs_f64());
        Duration::from_secs_f64(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_interval_never_grows() {
        let mut backoff = PollBackoff::new(BackoffConfig::new(
            Duration::from_secs(10),
            Duration::from_secs(10),
        ));
        for _ in 0..5 {
            backoff.record_failure();
            assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        }
    }

    #[test]
    fn test_failures_grow_within_bounds() {
        let mut backoff = PollBackoff::new(BackoffConfig::new(
            Duration::from_secs(10),
            Duration::from_secs(300),
        ));
        for _ in 0..10 {
            backoff.record_failure();
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_secs(10));
            assert!(delay <= Duration::from_secs(300));
        }
        assert_eq!(backoff.consecutive_failures(), 10);
    }

    #[test]
    fn test_many_failures_reach_the_cap_region() {
        let mut backoff = PollBackoff::new(BackoffConfig::new(
            Duration::from_secs(1),
            Duration::from_secs(64),
        ));
        for _ in 0..20 {
            backoff.record_failure();
        }
        // Capped at 64s before jitter, so at least half of it remains
        assert!(backoff.next_delay() >= Duration::from_secs(32));
    }

    #[test]
    fn test_success_resets_delay() {
        let mut backoff = PollBackoff::new(BackoffConfig::new(
            Duration::from_secs(5),
            Duration::from_secs(60),
        ));
        backoff.record_failure();
        backoff.record_failure();
        backoff.record_success();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.consecutive_failures(), 0);
    }

    #[test]
    fn test_max_below_interval_is_raised() {
        let config = BackoffConfig::new(Duration::from_secs(30), Duration::from_secs(5));
        assert_eq!(config.max_delay, Duration::from_secs(30));
    }
}
