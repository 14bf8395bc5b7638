//! # Exponential Backoff
//!
//! Provides the backoff mechanism used for transient-failure retries.
//!
//! Each delay doubles the previous one, capped at a maximum interval. The
//! retry loops that consume it are additionally bounded by a maximum number
//! of attempts and a maximum elapsed duration, so a permanently unavailable
//! backend can never be retried indefinitely.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use secret_sync_controller::controller::backoff::ExponentialBackoff;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(8));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
//! ```

use crate::constants;
use std::time::Duration;

/// Exponential backoff calculator
///
/// Generates doubling backoff durations capped at a maximum. Each resource
/// (or fetch loop) owns its own instance so backoff state never interferes
/// across resources.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First delay, also the value restored by `reset`
    initial: Duration,
    /// Cap applied to the doubling sequence
    max: Duration,
    /// Next delay to hand out
    current: Duration,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = std::cmp::min(self.current.saturating_mul(2), self.max);
        result
    }

    /// Reset the sequence to the initial delay (after a success)
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Bounds for a transient-failure retry loop.
///
/// A loop gives up when it has used `max_attempts` rounds or when
/// `max_elapsed` has passed since the first attempt, whichever comes first.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum fetch rounds, counting the first attempt
    pub max_attempts: u32,
    /// Maximum wall time across all rounds including backoff sleeps
    pub max_elapsed: Duration,
    /// First retry delay
    pub initial_interval: Duration,
    /// Cap on the retry delay
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_FETCH_MAX_ATTEMPTS,
            max_elapsed: Duration::from_secs(constants::DEFAULT_FETCH_MAX_ELAPSED_SECS),
            initial_interval: Duration::from_millis(constants::DEFAULT_FETCH_BACKOFF_INITIAL_MS),
            max_interval: Duration::from_millis(constants::DEFAULT_FETCH_BACKOFF_MAX_MS),
        }
    }
}

impl RetryPolicy {
    /// Backoff sequence for one retry loop under this policy
    #[must_use]
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.initial_interval, self.max_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence_doubles() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));

        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(16));
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(8));

        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
        // Next would be 16s, but the sequence is capped
        assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
        // Should stay at max
        assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));

        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));

        backoff.reset();

        // Should restart from the beginning after success
        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn test_independent_backoff_state_per_instance() {
        let mut backoff1 =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
        let mut backoff2 =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));

        assert_eq!(backoff1.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff1.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff1.next_backoff(), Duration::from_secs(4));

        // Second instance starts fresh with its own sequence
        assert_eq!(backoff2.next_backoff(), Duration::from_secs(1));

        backoff1.reset();
        assert_eq!(backoff1.next_backoff(), Duration::from_secs(1));

        // Second instance continues independently from where it left off
        assert_eq!(backoff2.next_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn test_retry_policy_default_bounds() {
        let policy = RetryPolicy::default();
        assert!(policy.max_attempts > 0);
        assert!(policy.max_elapsed > policy.max_interval);
        let mut backoff = policy.backoff();
        assert_eq!(backoff.next_backoff(), policy.initial_interval);
    }
}
