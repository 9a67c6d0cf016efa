//! Retry strategies derived from an error classification.

use std::time::Duration;

use super::classifier::ErrorClass;

/// Retry tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// First backoff delay for transient failures.
    pub transient_base: Duration,
    /// Cap on a single transient backoff delay.
    pub transient_max_delay: Duration,
    /// Retries allowed for a transient failure.
    pub transient_max_attempts: u32,
    /// Delay used when a rate-limit response carries no hint.
    pub rate_limit_default: Duration,
    /// Retries allowed for a rate-limited failure.
    pub rate_limit_max_attempts: u32,
    /// First backoff delay for unclassified failures.
    pub unknown_base: Duration,
    /// Cap on a single unclassified backoff delay.
    pub unknown_max_delay: Duration,
    /// Retries allowed for an unclassified failure.
    pub unknown_max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transient_base: Duration::from_secs(1),
            transient_max_delay: Duration::from_secs(15),
            transient_max_attempts: 3,
            rate_limit_default: Duration::from_secs(10),
            rate_limit_max_attempts: 3,
            unknown_base: Duration::from_secs(2),
            unknown_max_delay: Duration::from_secs(8),
            unknown_max_attempts: 2,
        }
    }
}

/// How to retry one failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Do not retry.
    None,
    /// Wait the same delay before every retry.
    Fixed { delay: Duration, max_attempts: u32 },
    /// Double the delay on every retry, capped at `max_delay`.
    ExponentialBackoff {
        base: Duration,
        max_delay: Duration,
        max_attempts: u32,
    },
}

impl RetryStrategy {
    /// Delay before retry number `attempt` (0-based), or `None` once the
    /// strategy is exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match *self {
            RetryStrategy::None => None,
            RetryStrategy::Fixed { delay, max_attempts } => (attempt < max_attempts).then_some(delay),
            RetryStrategy::ExponentialBackoff {
                base,
                max_delay,
                max_attempts,
            } => {
                if attempt >= max_attempts {
                    return None;
                }
                let factor = 2u32.saturating_pow(attempt.min(16));
                Some(base.saturating_mul(factor).min(max_delay))
            }
        }
    }

    /// Total number of retries the strategy allows.
    pub fn max_attempts(&self) -> u32 {
        match *self {
            RetryStrategy::None => 0,
            RetryStrategy::Fixed { max_attempts, .. } | RetryStrategy::ExponentialBackoff { max_attempts, .. } => {
                max_attempts
            }
        }
    }
}

/// Maps error classes onto retry strategies.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy with explicit tuning.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The tuning in effect.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Strategy for a classified failure.
    pub fn strategy_for(&self, class: &ErrorClass) -> RetryStrategy {
        match class {
            ErrorClass::Permanent => RetryStrategy::None,
            ErrorClass::Transient => RetryStrategy::ExponentialBackoff {
                base: self.config.transient_base,
                max_delay: self.config.transient_max_delay,
                max_attempts: self.config.transient_max_attempts,
            },
            ErrorClass::RateLimited { retry_after } => RetryStrategy::Fixed {
                delay: retry_after.unwrap_or(self.config.rate_limit_default),
                max_attempts: self.config.rate_limit_max_attempts,
            },
            ErrorClass::Unknown => RetryStrategy::ExponentialBackoff {
                base: self.config.unknown_base,
                max_delay: self.config.unknown_max_delay,
                max_attempts: self.config.unknown_max_attempts,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::retry::classify;

    #[test]
    fn test_permanent_never_retries() {
        let policy = RetryPolicy::default();
        let strategy = policy.strategy_for(&classify(&LlmError::http(401, "bad key")));
        assert_eq!(strategy, RetryStrategy::None);
        assert_eq!(strategy.next_delay(0), None);
        assert_eq!(strategy.max_attempts(), 0);
    }

    #[test]
    fn test_rate_limit_uses_extracted_delay() {
        let policy = RetryPolicy::default();
        let strategy = policy.strategy_for(&classify(&LlmError::http(429, "retry_after: 7")));
        assert_eq!(
            strategy,
            RetryStrategy::Fixed {
                delay: Duration::from_secs(7),
                max_attempts: 3
            }
        );
        assert_eq!(strategy.next_delay(0), Some(Duration::from_secs(7)));
        assert_eq!(strategy.next_delay(2), Some(Duration::from_secs(7)));
        assert_eq!(strategy.next_delay(3), None);
    }

    #[test]
    fn test_rate_limit_default_delay() {
        let policy = RetryPolicy::default();
        let strategy = policy.strategy_for(&ErrorClass::RateLimited { retry_after: None });
        assert_eq!(strategy.next_delay(0), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_server_error_backs_off_then_expires() {
        let policy = RetryPolicy::default();
        let strategy = policy.strategy_for(&classify(&LlmError::http(500, "oops")));

        let first = strategy.next_delay(0).unwrap();
        let second = strategy.next_delay(1).unwrap();
        assert!(second > first);
        assert_eq!(strategy.next_delay(policy.config().transient_max_attempts), None);
    }

    #[test]
    fn test_backoff_is_capped() {
        let strategy = RetryStrategy::ExponentialBackoff {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_attempts: 10,
        };
        assert_eq!(strategy.next_delay(0), Some(Duration::from_secs(1)));
        assert_eq!(strategy.next_delay(2), Some(Duration::from_secs(4)));
        assert_eq!(strategy.next_delay(3), Some(Duration::from_secs(5)));
        assert_eq!(strategy.next_delay(9), Some(Duration::from_secs(5)));
        assert_eq!(strategy.next_delay(10), None);
    }

    #[test]
    fn test_unknown_is_more_conservative_than_transient() {
        let policy = RetryPolicy::default();
        let transient = policy.strategy_for(&ErrorClass::Transient);
        let unknown = policy.strategy_for(&ErrorClass::Unknown);
        assert!(unknown.max_attempts() < transient.max_attempts());
    }
}
