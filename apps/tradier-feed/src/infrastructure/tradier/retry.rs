//! Retry policy for Tradier REST calls.
//!
//! Tradier signals rate limiting with `403 Forbidden`, so by default only
//! that status (plus connection resets) is retried.

use std::time::Duration;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub backoff_base: Duration,
    /// Growth factor between successive retries.
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max_backoff: Duration,
    /// HTTP statuses treated as transient.
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(4),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(120),
            retry_statuses: vec![403],
        }
    }
}

impl RetryConfig {
    /// Check if a response status should be retried.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

/// Exponential backoff for one request: `base`, `base * m`, `base * m^2`, ...
#[derive(Debug)]
pub struct RetryBackoff {
    retries: u32,
    max_retries: u32,
    current: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl RetryBackoff {
    /// Start a fresh backoff sequence.
    #[must_use]
    pub const fn new(config: &RetryConfig) -> Self {
        Self {
            retries: 0,
            max_retries: config.max_retries,
            current: config.backoff_base,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    /// Delay before the next retry, or `None` once retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.max_retries {
            return None;
        }
        self.retries += 1;

        let delay = self.current.min(self.max_backoff);
        self.current = Duration::from_secs_f64(
            (self.current.as_secs_f64() * self.multiplier).min(self.max_backoff.as_secs_f64()),
        );
        Some(delay)
    }

    /// Attempts made so far, including the first.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.retries + 1
    }
}
