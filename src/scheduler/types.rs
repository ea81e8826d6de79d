//! Scheduler type definitions.

use thiserror::Error;

/// Errors that can occur when constructing the scheduler.
///
/// Scheduling decisions themselves never error; they report `bool`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler was created outside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// The jitter limit is not a fraction in `[0, 1]`.
    #[error("invalid jitter limit: {0}")]
    InvalidJitterLimit(f64),
}

/// Default cap on the jitter fraction a job may request.
pub const DEFAULT_JITTER_LIMIT: f64 = 0.6;

/// Check a jitter limit before it is used for a batch of jobs.
pub fn validate_jitter_limit(limit: f64) -> Result<f64, SchedulerError> {
    if limit.is_finite() && (0.0..=1.0).contains(&limit) {
        Ok(limit)
    } else {
        Err(SchedulerError::InvalidJitterLimit(limit))
    }
}
