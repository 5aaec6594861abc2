//! Retry policy as a pure decision function, testable without real delays.

use std::time::Duration;

use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.base_delay_ms),
        }
    }

    /// Decide whether to retry after the `attempt`-th failure (1-based).
    /// Returns the backoff delay, or `None` to give up. Non-retryable
    /// failures never retry.
    pub fn next_delay(&self, attempt: u32, retryable: bool) -> Option<Duration> {
        if !retryable || attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        Some(self.base_delay.saturating_mul(factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1000,
        })
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let p = policy();
        assert_eq!(p.next_delay(1, true), Some(Duration::from_millis(1000)));
        assert_eq!(p.next_delay(2, true), Some(Duration::from_millis(2000)));
        assert_eq!(p.next_delay(3, true), None);
    }

    #[test]
    fn non_retryable_never_retries() {
        assert_eq!(policy().next_delay(1, false), None);
    }
}
