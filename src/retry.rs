//! Bounded retry with exponential backoff for blob transfers.

use crate::error::{MaiarError, Result};
use crate::store::StoreError;
use log::warn;
use std::time::Duration;

/// How transient transfer failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `max_attempts` times without sleeping.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// # Examples
    ///
    /// ```
    /// use maiar::retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff(1), Duration::from_millis(500));
    /// assert_eq!(policy.backoff(3), Duration::from_secs(2));
    /// assert_eq!(policy.backoff(10), Duration::from_secs(8));
    /// ```
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `action` until it succeeds, fails non-transiently, or the
    /// attempt budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`MaiarError::TransferFailed`] once every attempt failed
    /// transiently, or the first non-transient [`StoreError`] unchanged.
    pub fn run<T, F>(&self, operation: &str, mut action: F) -> Result<T>
    where
        F: FnMut() -> std::result::Result<T, StoreError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match action() {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(MaiarError::Store(err)),
                Err(err) if attempt >= attempts => {
                    return Err(MaiarError::TransferFailed {
                        operation: operation.to_owned(),
                        attempts,
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    let delay = self.backoff(attempt);
                    warn!("{operation} attempt {attempt}/{attempts} failed: {err}; retrying in {delay:?}");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
