//! Bounded exponential backoff for optimistic-concurrency retries.
//!
//! A [`BackoffPolicy`] is a plain value: it decides how many attempts a retry
//! loop may make and how long to wait between them. Keeping it free of any
//! I/O lets the loop that consumes it stay small and lets the schedule be
//! tested on its own.
//!
//! # Example
//!
//! ```ignore
//! use crossnet_common::BackoffPolicy;
//!
//! let policy = BackoffPolicy::with_max_attempts(3);
//! for attempt in 1..=policy.max_attempts {
//!     // ... try the write ...
//!     tokio::time::sleep(policy.delay_for(attempt)).await;
//! }
//! ```

use std::time::Duration;

use crate::Error;

/// Retry schedule: capped attempt count with non-decreasing delays.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (always at least 1)
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Growth factor applied per attempt (>= 1.0)
    pub factor: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            factor: 2.0,
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Policy that never sleeps, for tests and dry runs
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            base_delay: Duration::ZERO,
            factor: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Reject schedules that could loop forever or shrink between attempts
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_attempts == 0 {
            return Err(Error::config("backoff max_attempts must be at least 1"));
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(Error::config(format!(
                "backoff factor must be a finite value >= 1.0, got {}",
                self.factor
            )));
        }
        if self.max_delay < self.base_delay {
            return Err(Error::config(format!(
                "backoff max_delay ({:?}) is shorter than base_delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }
        Ok(())
    }

    /// Delay to wait after the given (1-based) failed attempt.
    ///
    /// `base_delay * factor^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.factor.max(1.0).powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else if capped.is_finite() {
            Duration::ZERO
        } else {
            self.max_delay
        }
    }

    /// Full delay schedule, one entry per attempt
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).map(move |attempt| self.delay_for(attempt))
    }

    /// Upper bound on total time spent sleeping across all attempts
    pub fn total_delay(&self) -> Duration {
        self.delays().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_bounded_and_valid() {
        let policy = BackoffPolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delays().count(), 5);
    }

    #[test]
    fn delays_grow_exponentially_until_capped() {
        let policy = BackoffPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_millis(500),
        };

        let delays: Vec<_> = policy.delays().map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500, 500]);
    }

    #[test]
    fn delays_never_decrease() {
        let policy = BackoffPolicy {
            max_attempts: 40,
            base_delay: Duration::from_millis(3),
            factor: 1.7,
            max_delay: Duration::from_secs(2),
        };

        let delays: Vec<_> = policy.delays().collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn huge_attempt_numbers_saturate_at_max_delay() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), policy.max_delay);
    }

    #[test]
    fn immediate_policy_never_sleeps() {
        let policy = BackoffPolicy::immediate(4);
        assert!(policy.validate().is_ok());
        assert_eq!(policy.total_delay(), Duration::ZERO);
    }

    #[test]
    fn validate_rejects_unbounded_or_shrinking_schedules() {
        assert!(BackoffPolicy::with_max_attempts(0).validate().is_err());

        let shrinking = BackoffPolicy {
            factor: 0.5,
            ..Default::default()
        };
        assert!(shrinking.validate().is_err());

        let nan = BackoffPolicy {
            factor: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());

        let inverted = BackoffPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }
}
