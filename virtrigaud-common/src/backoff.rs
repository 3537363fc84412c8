//! Exponential backoff with cap and optional jitter.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff calculator.
///
/// Delays grow as `base * multiplier^attempt`, capped at `max`. With jitter
/// enabled the computed delay is scaled by a random factor in `[0.5, 1.0]`
/// so that a fleet of retrying callers does not thunder in lockstep.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// First delay
    pub base: Duration,
    /// Upper bound for any delay
    pub max: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Randomize delays
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl Backoff {
    /// Backoff tuned for provider-call retries: short base, tight cap.
    pub fn provider() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Compute the delay for a zero-based attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.min(31) as i32);
        let raw = self.base.as_secs_f64() * exp;
        let capped = raw.min(self.max.as_secs_f64());
        let secs = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..=1.0);
            capped * factor
        } else {
            capped
        };
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_and_caps() {
        let backoff = Backoff {
            base: Duration::from_secs(1),
            max: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
        assert_eq!(backoff.delay(10), Duration::from_secs(8));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let backoff = Backoff {
            base: Duration::from_secs(4),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        };
        for attempt in 0..5 {
            let delay = backoff.delay(attempt);
            let ceiling = Duration::from_secs(4 * 2u64.pow(attempt));
            assert!(delay <= ceiling.min(Duration::from_secs(60)));
            assert!(delay >= ceiling.min(Duration::from_secs(60)) / 2);
        }
    }
}
