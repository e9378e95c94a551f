//! Delay policy between sequential invocation attempts.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for delays between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Next attempt starts immediately.
    #[default]
    None,
    /// delay = base
    Constant,
    /// delay = base * attempt
    Linear,
    /// delay = base * 2^(attempt - 1)
    Exponential,
}

/// Jitter strategy to spread retries of concurrent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Computes the pause before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBackoff {
    /// Backoff strategy.
    #[serde(default)]
    pub strategy: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
    /// Base delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::None,
            jitter: JitterStrategy::None,
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryBackoff {
    /// No pause between attempts.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the strategy and base delay.
    #[must_use]
    pub fn with_strategy(mut self, strategy: BackoffStrategy, base_delay_ms: u64) -> Self {
        self.strategy = strategy;
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Returns the delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.strategy {
            BackoffStrategy::None => 0,
            BackoffStrategy::Constant => base.min(max),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt)).min(max),
            BackoffStrategy::Exponential => base
                .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
                .min(max),
        };

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_immediate() {
        let backoff = RetryBackoff::default();
        assert_eq!(backoff.delay(1), Duration::ZERO);
        assert_eq!(backoff.delay(5), Duration::ZERO);
    }

    #[test]
    fn test_constant_backoff() {
        let backoff = RetryBackoff::none().with_strategy(BackoffStrategy::Constant, 200);
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(200));
    }

    #[test]
    fn test_linear_backoff() {
        let backoff = RetryBackoff::none().with_strategy(BackoffStrategy::Linear, 100);
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(3), Duration::from_millis(300));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = RetryBackoff::none()
            .with_strategy(BackoffStrategy::Exponential, 100)
            .with_max_delay_ms(500);
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(500));
    }

    #[test]
    fn test_full_jitter_bounds() {
        let backoff = RetryBackoff::none()
            .with_strategy(BackoffStrategy::Constant, 1000)
            .with_jitter(JitterStrategy::Full);

        for _ in 0..100 {
            assert!(backoff.delay(1) <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_equal_jitter_bounds() {
        let backoff = RetryBackoff::none()
            .with_strategy(BackoffStrategy::Constant, 1000)
            .with_jitter(JitterStrategy::Equal);

        for _ in 0..100 {
            let delay = backoff.delay(1);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }
}
