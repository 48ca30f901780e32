//! Error types for Cadence.

use std::time::Duration;
use thiserror::Error;

/// Main error type for Cadence operations.
#[derive(Error, Debug)]
pub enum CadenceError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rate-limited operation was rejected
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejection produced by [`RateLimiter::with_rate_limit`](crate::ratelimit::RateLimiter::with_rate_limit).
///
/// Plain `check_limit` callers never see this; they get `allowed = false` instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rate limit exceeded, try again in {} seconds", retry_after_secs(.retry_after))]
pub struct RateLimitExceeded {
    /// Milliseconds the caller should wait before retrying
    pub retry_after: u64,
    /// Epoch milliseconds at which quota frees up
    pub reset_time: u64,
}

impl RateLimitExceeded {
    /// The retry delay as a [`Duration`].
    pub fn retry_after_duration(&self) -> Duration {
        Duration::from_millis(self.retry_after)
    }
}

fn retry_after_secs(retry_after_ms: &u64) -> u64 {
    retry_after_ms.div_ceil(1000)
}

/// Result type alias for Cadence operations.
pub type Result<T> = std::result::Result<T, CadenceError>;
