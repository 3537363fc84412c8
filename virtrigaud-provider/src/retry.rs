//! Retry policy for provider calls.

use std::time::Duration;

use virtrigaud_common::backoff::Backoff;

/// Bounded retry with exponential backoff.
///
/// Only errors whose kind is retryable (Retryable, RateLimit, Unavailable,
/// Timeout) are retried; the rest surface immediately. RateLimit waits twice
/// the computed delay. The policy never extends the caller's deadline; the
/// enclosing call is bounded as a whole.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::provider(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::provider(),
        }
    }

    /// Delay before retry number `attempt` (zero-based), doubled for
    /// rate-limit pushback.
    pub fn delay(&self, attempt: u32, rate_limited: bool) -> Duration {
        let base = self.backoff.delay(attempt);
        if rate_limited {
            base * 2
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_doubles_delay() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Backoff {
                base: Duration::from_secs(1),
                max: Duration::from_secs(60),
                multiplier: 2.0,
                jitter: false,
            },
        };
        assert_eq!(policy.delay(0, false), Duration::from_secs(1));
        assert_eq!(policy.delay(0, true), Duration::from_secs(2));
        assert_eq!(policy.delay(2, true), Duration::from_secs(8));
    }
}
