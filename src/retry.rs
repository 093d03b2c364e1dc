//! Retry logic with exponential backoff
//!
//! Retry state (attempt counter, next delay) lives entirely inside one call of
//! [`retry_with_backoff`]; nothing is shared between requests.
//!
//! # Example
//!
//! ```no_run
//! use bulk_dl::retry::{IsRetryable, retry_with_backoff};
//! use bulk_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! retry_with_backoff(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::TransportError;
use rand::Rng;
use std::time::Duration;

/// HTTP status codes that are treated as transient
pub const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Delay the remote side asked for before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Wrap the final error once the attempt budget is spent
    fn into_exhausted(self, _attempts: u32) -> Self
    where
        Self: Sized,
    {
        self
    }
}

/// Whether a status code is worth another attempt
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}

/// Only idempotent methods are ever replayed
pub fn is_idempotent(method: &reqwest::Method) -> bool {
    *method == reqwest::Method::GET || *method == reqwest::Method::HEAD
}

impl IsRetryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Status { status, .. } => is_retryable_status(*status),
            // Builder errors mean the request itself was malformed
            TransportError::Request { source, .. } => {
                !source.is_builder()
                    && (source.is_timeout() || source.is_connect() || source.is_request())
            }
            TransportError::Timeout { .. } => true,
            TransportError::InvalidUrl { .. } => false,
            TransportError::Exhausted { .. } => false,
            // The body is streamed straight to disk, so a broken body cannot be replayed
            TransportError::Body(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    fn into_exhausted(self, attempts: u32) -> Self {
        if attempts <= 1 {
            return self;
        }
        TransportError::Exhausted {
            attempts,
            last: Box::new(self),
        }
    }
}

/// Backoff delay before retry number `retry` (1-based)
///
/// `initial_delay * backoff_multiplier^(retry - 1)`, capped at `max_delay`.
pub fn backoff_delay(config: &RetryConfig, retry: u32) -> Duration {
    let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    if !secs.is_finite() || secs >= config.max_delay.as_secs_f64() {
        config.max_delay
    } else {
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// The operation runs at most `config.max_attempts` times. Non-retryable errors are
/// returned immediately; a retryable error on the last attempt is passed through
/// [`IsRetryable::into_exhausted`] before being returned.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = match e.retry_after() {
                    Some(requested) => requested.min(config.max_delay),
                    None if config.jitter => add_jitter(backoff_delay(config, attempt)),
                    None => backoff_delay(config, attempt),
                };

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                    return Err(e.into_exhausted(attempt));
                }
                tracing::debug!(error = %e, "Operation failed with non-retryable error");
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
