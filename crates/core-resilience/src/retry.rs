//! Retry policy with exponential backoff and jitter
//!
//! A [`RetryPolicy`] is an immutable value: it decides whether a failed
//! attempt may be retried and how long to wait before the next one. It holds
//! no per-call state, so one policy can be shared by every caller.
//!
//! # Example
//!
//! ```
//! use tether_core_resilience::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100))
//!     .with_jitter(false);
//!
//! assert_eq!(policy.next_delay(0), Duration::from_millis(10));
//! assert_eq!(policy.next_delay(1), Duration::from_millis(20));
//! ```

use crate::error::ResilienceError;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether an error is worth retrying
pub type Classifier = Arc<dyn Fn(&ResilienceError) -> bool + Send + Sync>;

/// Retry policy configuration
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub initial_delay: Duration,

    /// Upper bound on any single delay (before jitter)
    pub max_delay: Duration,

    /// Growth factor applied per attempt
    pub multiplier: f64,

    /// Add up to 10% random delay to desynchronize concurrent retriers
    pub jitter: bool,

    /// Retry-worthiness check; `None` retries every error
    pub classifier: Option<Classifier>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
            classifier: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .field("classifier", &self.classifier.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl RetryPolicy {
    /// Exponential policy doubling from `initial_delay` up to `max_delay`, with jitter
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Create a policy for fast retries against a local dependency
    pub fn fast() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            multiplier: 1.5,
            ..Default::default()
        }
    }

    /// Create a policy for network-flaky scenarios
    pub fn network() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Only retry errors accepted by `classifier`
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&ResilienceError) -> bool + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Only retry connect and operation failures
    pub fn transient_only(self) -> Self {
        self.with_classifier(ResilienceError::is_transient)
    }

    /// Number of attempts actually permitted (at least one)
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether the classifier accepts `err`, ignoring the attempt bound
    pub fn is_retryable(&self, err: &ResilienceError) -> bool {
        match &self.classifier {
            Some(classifier) => classifier(err),
            None => true,
        }
    }

    /// Whether another attempt may follow `attempts_made` failed ones
    pub fn should_retry(&self, err: &ResilienceError, attempts_made: u32) -> bool {
        attempts_made < self.attempts() && self.is_retryable(err)
    }

    /// Backoff after the zero-based `attempt` failed, without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let nanos = self.initial_delay.as_nanos() as f64 * self.multiplier.powi(exponent);
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos.max(0.0).round() as u64)
    }

    /// Backoff after the zero-based `attempt` failed
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if !self.jitter {
            return delay;
        }
        let span = u64::try_from((delay / 10).as_nanos()).unwrap_or(u64::MAX);
        delay + Duration::from_nanos(rand::rng().random_range(0..=span))
    }

    pub fn validate(&self) -> Result<(), ResilienceError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ResilienceError::InvalidConfig(format!(
                "retry multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(ResilienceError::InvalidConfig(format!(
                "retry initial_delay ({:?}) exceeds max_delay ({:?})",
                self.initial_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextError;
    use std::io;

    fn plain(max_attempts: u32, initial_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(initial_ms),
            Duration::from_millis(max_ms),
        )
        .with_jitter(false)
    }

    fn transient() -> ResilienceError {
        ResilienceError::operation_failed(io::Error::other("reset by peer"))
    }

    #[test]
    fn test_delay_sequence() {
        let policy = plain(3, 10, 100);

        assert_eq!(policy.next_delay(0), Duration::from_millis(10));
        assert_eq!(policy.next_delay(1), Duration::from_millis(20));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = plain(10, 10, 100);

        assert_eq!(policy.next_delay(3), Duration::from_millis(80));
        assert_eq!(policy.next_delay(4), Duration::from_millis(100));
        assert_eq!(policy.next_delay(9), Duration::from_millis(100));
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_millis(100));
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let policy = plain(20, 7, 5_000).with_multiplier(1.7);

        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let delay = policy.base_delay(attempt);
            assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            previous = delay;
        }
        assert_eq!(previous, Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_within_tenth() {
        let policy = plain(5, 100, 1_000).with_jitter(true);

        for attempt in 0..5 {
            let base = policy.base_delay(attempt);
            for _ in 0..50 {
                let delay = policy.next_delay(attempt);
                assert!(delay >= base);
                assert!(delay <= base + base / 10);
            }
        }
    }

    #[test]
    fn test_should_retry_respects_bound() {
        let policy = plain(3, 10, 100);
        let err = transient();

        assert!(policy.should_retry(&err, 1));
        assert!(policy.should_retry(&err, 2));
        assert!(!policy.should_retry(&err, 3));
        assert!(!policy.should_retry(&err, 4));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = plain(0, 10, 100);

        assert_eq!(policy.attempts(), 1);
        assert!(!policy.should_retry(&transient(), 1));
    }

    #[test]
    fn test_classifier() {
        let policy = plain(5, 10, 100).transient_only();

        assert!(policy.should_retry(&transient(), 1));
        assert!(!policy.should_retry(&ResilienceError::PoolClosed, 1));
        assert!(!policy.should_retry(
            &ResilienceError::Cancelled(ContextError::Cancelled),
            1
        ));

        let never = plain(5, 10, 100).with_classifier(|_| false);
        assert!(!never.should_retry(&transient(), 1));
    }

    #[test]
    fn test_presets_are_valid() {
        for policy in [
            RetryPolicy::default(),
            RetryPolicy::fast(),
            RetryPolicy::network(),
            RetryPolicy::no_retry(),
        ] {
            assert!(policy.validate().is_ok(), "{policy:?}");
        }
        assert_eq!(RetryPolicy::no_retry().attempts(), 1);
    }

    #[test]
    fn test_validate_rejects_shrinking_backoff() {
        assert!(plain(3, 10, 100).with_multiplier(0.5).validate().is_err());
        assert!(plain(3, 200, 100).validate().is_err());
        assert!(plain(3, 10, 100).with_multiplier(f64::NAN).validate().is_err());
    }
}
