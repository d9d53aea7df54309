//! Backoff retry for Git-hosting provider calls.
//!
//! Transient provider failures are retried exactly once before being
//! surfaced; the caller may then retry the whole action, which is safe
//! because nothing is recorded locally until the provider confirms.
//! Permanent errors are returned immediately.

use std::future::Future;
use std::time::Duration;

use super::error::{GitHostError, GitHostErrorKind};

/// Configuration for retry backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    pub max_delay: Duration,

    /// Multiplier per attempt (typically 2.0).
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Default configuration: a single retry after 2 seconds.
    pub const DEFAULT: Self = Self {
        max_retries: 1,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(8),
        backoff_multiplier: 2.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Computes the delay for the given retry attempt (0-indexed), growing
    /// exponentially and capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Retry policy for controlling retry behavior at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry transient errors with backoff.
    #[default]
    RetryTransient,

    /// Do not retry; return errors immediately.
    NoRetry,
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T> {
    /// The operation succeeded.
    Success(T),

    /// A transient error persisted through all retries.
    ExhaustedRetries {
        last_error: GitHostError,
        /// Number of attempts made, including the initial one.
        attempts: u32,
    },

    /// A permanent error occurred (not retriable).
    PermanentError(GitHostError),
}

impl<T> RetryResult<T> {
    /// Converts to a Result, treating exhausted retries and permanent
    /// errors as Err.
    pub fn into_result(self) -> Result<T, GitHostError> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::ExhaustedRetries { last_error, .. } => Err(last_error),
            RetryResult::PermanentError(e) => Err(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }
}

/// Executes an async operation with retry logic.
///
/// The operation is re-run on a transient error until the configured
/// attempts are exhausted. Permanent errors are returned immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    config: RetryConfig,
    policy: RetryPolicy,
    mut operation: F,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GitHostError>>,
{
    let mut attempt = 0;
    let max_attempts = if policy == RetryPolicy::NoRetry {
        1
    } else {
        config.max_retries + 1
    };

    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) => {
                attempt += 1;

                match e.kind {
                    GitHostErrorKind::Permanent => return RetryResult::PermanentError(e),
                    GitHostErrorKind::Transient => {
                        if attempt >= max_attempts {
                            return RetryResult::ExhaustedRetries {
                                last_error: e,
                                attempts: attempt,
                            };
                        }

                        let delay = config.delay_for_attempt(attempt - 1);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
