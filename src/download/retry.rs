//! Bounded retry for page fetches.
//!
//! Every failed attempt is classified into a [`FailureType`]:
//! - [`FailureType::TokenExpired`] - HTTP 403, the lending token lapsed; re-borrow and retry at once
//! - [`FailureType::Transient`] - other statuses and transport failures; wait, then retry
//! - [`FailureType::Permanent`] - local write failures; retrying would not help
//!
//! [`RetryPolicy`] caps the number of requests per page. Re-borrow attempts
//! count toward the cap, so a permanently revoked token cannot hang a run.
//!
//! # Example
//!
//! ```
//! use book_downloader_core::download::{
//!     FailureType, PageFetchError, RetryDecision, RetryPolicy, classify_error,
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = PageFetchError::http_status(3, 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::PageFetchError;

/// Default maximum requests per page.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default wait between attempts after a transient failure.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Classification of a failed page attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// The lending token expired (HTTP 403).
    TokenExpired,

    /// Temporary failure: non-200 status or network error.
    Transient,

    /// Failure that won't go away by asking again.
    Permanent,
}

/// Decision on whether to try a page again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay`.
    Retry {
        /// How long to wait first.
        delay: Duration,
        /// Which attempt this will be (1-indexed, so the first retry is attempt 2).
        attempt: u32,
    },

    /// Give up on the page.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Attempt cap and backoff for page fetches.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `delay`: 1 second (fixed, not exponential)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Wait after a transient failure.
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is raised to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Creates a policy with a custom `max_attempts` and the default delay.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self::new(max_attempts, DEFAULT_RETRY_DELAY)
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the wait applied after transient failures.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decides whether to try again after attempt number `attempt` (1-indexed) failed.
    #[instrument(level = "trace", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        // A fresh token makes an immediate retry worthwhile.
        let delay = match failure_type {
            FailureType::TokenExpired => Duration::ZERO,
            FailureType::Transient | FailureType::Permanent => self.delay,
        };

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }
}

/// Classifies a failed attempt.
#[must_use]
pub fn classify_error(error: &PageFetchError) -> FailureType {
    match error {
        PageFetchError::HttpStatus { status: 403, .. } => FailureType::TokenExpired,
        PageFetchError::HttpStatus { .. }
        | PageFetchError::Session { .. }
        | PageFetchError::Renewal { .. } => FailureType::Transient,
        PageFetchError::Io { .. } => FailureType::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionError;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_new_clamps_zero_attempts() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn test_transient_retries_with_fixed_delay() {
        let policy = RetryPolicy::default();
        for attempt in 1..3 {
            assert_eq!(
                policy.should_retry(FailureType::Transient, attempt),
                RetryDecision::Retry {
                    delay: Duration::from_secs(1),
                    attempt: attempt + 1,
                }
            );
        }
    }

    #[test]
    fn test_token_expired_retries_immediately() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.should_retry(FailureType::TokenExpired, 1),
            RetryDecision::Retry {
                delay: Duration::ZERO,
                attempt: 2,
            }
        );
    }

    #[test]
    fn test_exhaustion_stops_every_kind() {
        let policy = RetryPolicy::with_max_attempts(3);
        for kind in [FailureType::Transient, FailureType::TokenExpired] {
            assert!(matches!(
                policy.should_retry(kind, 3),
                RetryDecision::DoNotRetry { .. }
            ));
        }
    }

    #[test]
    fn test_permanent_never_retries() {
        let policy = RetryPolicy::with_max_attempts(10);
        assert!(matches!(
            policy.should_retry(FailureType::Permanent, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(
            classify_error(&PageFetchError::http_status(0, 403)),
            FailureType::TokenExpired
        );
        assert_eq!(
            classify_error(&PageFetchError::http_status(0, 500)),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&PageFetchError::http_status(0, 404)),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&PageFetchError::Session {
                index: 0,
                source: SessionError::timeout("https://ia.test/p.jpg"),
            }),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&PageFetchError::io(
                "/x",
                std::io::Error::other("disk full")
            )),
            FailureType::Permanent
        );
    }
}
