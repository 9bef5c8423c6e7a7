use std::time::Duration;

use crate::config::SyncConfig;

/// Sentinel delay that disables automatic retries.
pub const NEVER: Duration = Duration::MAX;

/// Exponential retry delay for failed syncs.
///
/// Starts at `min`, multiplies by `multiplier` after every scheduled retry
/// and is capped at `max`. Any success drops it back to `min`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryBackoff {
    current: Duration,
    min: Duration,
    max: Duration,
    multiplier: f64,
}

impl RetryBackoff {
    pub fn new(min: Duration, max: Duration, multiplier: f64) -> Self {
        let max = max.max(min);
        Self {
            current: min,
            min,
            max,
            multiplier: multiplier.max(1.0),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        if !config.auto_retry {
            return Self::disabled();
        }
        Self::new(
            Duration::from_secs(config.min_retry_delay_secs),
            Duration::from_secs(config.max_retry_delay_secs),
            config.retry_multiplier,
        )
    }

    /// A backoff whose delay is always [`NEVER`].
    pub fn disabled() -> Self {
        Self::new(NEVER, NEVER, 1.0)
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn is_disabled(&self) -> bool {
        self.current == NEVER
    }

    /// Delay for the retry being scheduled now; grows the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        if delay != NEVER {
            let grown = delay.as_secs_f64() * self.multiplier;
            self.current = if grown >= self.max.as_secs_f64() {
                self.max
            } else {
                Duration::from_secs_f64(grown).clamp(self.min, self.max)
            };
        }
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_grows_and_caps() {
        let mut backoff = RetryBackoff::default();
        let delays: Vec<u64> = (0..9).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 300, 300, 300]);
    }

    #[test]
    fn test_stays_within_bounds() {
        let mut backoff = RetryBackoff::new(secs(3), secs(50), 1.7);
        for _ in 0..40 {
            let d = backoff.next_delay();
            assert!(d >= secs(3) && d <= secs(50), "delay out of bounds: {d:?}");
        }
    }

    #[test]
    fn test_reset_returns_to_min() {
        let mut backoff = RetryBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), secs(20));
        backoff.reset();
        assert_eq!(backoff.current(), secs(5));
        assert_eq!(backoff.next_delay(), secs(5));
    }

    #[test]
    fn test_disabled_never_schedules() {
        let config = SyncConfig {
            auto_retry: false,
            ..SyncConfig::default()
        };
        let mut backoff = RetryBackoff::from_config(&config);
        assert!(backoff.is_disabled());
        assert_eq!(backoff.next_delay(), NEVER);
        backoff.reset();
        assert!(backoff.is_disabled());
    }

    #[test]
    fn test_max_below_min_is_lifted() {
        let mut backoff = RetryBackoff::new(secs(10), secs(2), 2.0);
        assert_eq!(backoff.next_delay(), secs(10));
        assert_eq!(backoff.next_delay(), secs(10));
    }
}
