//! Backoff schedules for transient provider failures.

use std::fmt;
use std::time::Duration;

/// How a [`ChatModel`](crate::ChatModel) spaces out repeated provider calls.
///
/// `max_retries` counts calls after the first, so a policy with
/// `max_retries = 2` makes at most three attempts.
///
/// # Examples
///
/// ```
/// use gears::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential(3, Duration::from_millis(250));
/// assert_eq!(policy.total_attempts(), 4);
/// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(250)));
/// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(1000)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Give up after the first failure.
    #[default]
    None,
    /// Wait the same delay before every retry.
    Fixed {
        max_retries: u32,
        delay: Duration,
    },
    /// Multiply the delay after every retry, capped at `max_delay`.
    ExponentialBackoff {
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    },
}

/// Returned by [`RetryPolicy::exponential_backoff`] for unusable parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicyError(pub &'static str);

impl fmt::Display for RetryPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RetryPolicyError {}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        RetryPolicy::Fixed { max_retries, delay }
    }

    /// Doubling backoff capped at 60 seconds.
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        RetryPolicy::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }

    /// Backoff with explicit cap and multiplier.
    ///
    /// # Errors
    ///
    /// - `multiplier` is 0 or greater than 10
    /// - `max_delay` is shorter than `initial_delay`
    pub fn exponential_backoff(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    ) -> Result<Self, RetryPolicyError> {
        if multiplier == 0 {
            return Err(RetryPolicyError("multiplier must be greater than 0"));
        }
        if multiplier > 10 {
            return Err(RetryPolicyError(
                "multiplier must be 10 or less to avoid overflow",
            ));
        }
        if max_delay < initial_delay {
            return Err(RetryPolicyError("max_delay must be >= initial_delay"));
        }
        Ok(RetryPolicy::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay,
            multiplier,
        })
    }

    pub fn max_retries(&self) -> u32 {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Fixed { max_retries, .. } => *max_retries,
            RetryPolicy::ExponentialBackoff { max_retries, .. } => *max_retries,
        }
    }

    /// Attempt ceiling, first call included.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries().saturating_add(1)
    }

    /// Delay before retry number `attempt` (0-indexed), `None` if the policy
    /// never retries.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed { delay, .. } => Some(*delay),
            RetryPolicy::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let factor = (*multiplier as u64).saturating_pow(attempt);
                let delay = (initial_delay.as_millis() as u64).saturating_mul(factor);
                Some(Duration::from_millis(
                    delay.min(max_delay.as_millis() as u64),
                ))
            }
        }
    }
}

/// Scales `delay` by a random factor in `[0.8, 1.2)`.
pub(crate) fn jittered(delay: Duration) -> Duration {
    let factor = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_none() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 0);
        assert_eq!(policy.total_attempts(), 1);
        assert_eq!(policy.delay_for_attempt(0), None);
    }

    #[test]
    fn test_retry_policy_fixed() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(5));
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(5)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_retry_policy_exponential_is_capped() {
        let policy = RetryPolicy::exponential_backoff(
            5,
            Duration::from_millis(100),
            Duration::from_secs(1),
            2,
        )
        .unwrap();
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(800)));
        assert_eq!(policy.delay_for_attempt(4), Some(Duration::from_secs(1)));
        // no overflow on absurd attempt numbers
        assert_eq!(policy.delay_for_attempt(200), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_retry_policy_validation() {
        let zero = RetryPolicy::exponential_backoff(
            3,
            Duration::from_millis(100),
            Duration::from_secs(10),
            0,
        );
        assert_eq!(
            zero.unwrap_err().0,
            "multiplier must be greater than 0"
        );

        let huge = RetryPolicy::exponential_backoff(
            3,
            Duration::from_millis(100),
            Duration::from_secs(10),
            11,
        );
        assert!(huge.is_err());

        let inverted = RetryPolicy::exponential_backoff(
            3,
            Duration::from_secs(10),
            Duration::from_millis(100),
            2,
        );
        assert_eq!(
            inverted.unwrap_err().to_string(),
            "max_delay must be >= initial_delay"
        );
    }

    #[test]
    fn test_jitter_stays_in_band() {
        for _ in 0..100 {
            let d = jittered(Duration::from_millis(1000));
            assert!(d >= Duration::from_millis(800));
            assert!(d < Duration::from_millis(1200));
        }
    }
}
