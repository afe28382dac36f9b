//! Retry logic with exponential backoff for transient transfer failures.
//!
//! When a transfer fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - timeouts, closed connections, connect failures and
//!   truncated bodies; retried with backoff
//! - [`FailureType::Permanent`] - any other transport or local IO failure
//! - [`FailureType::FileConflict`] - another writer holds the destination
//! - [`FailureType::Cancelled`] - the run was stopped
//!
//! The [`RetryPolicy`] then decides whether to retry based on failure type and
//! attempt count, calculating exponential backoff delays with jitter.
//!
//! # Example
//!
//! ```
//! use blogfetch_core::download::{DownloadError, RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = DownloadError::incomplete("https://media.example/a.jpg", 100, 40);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {delay:?} (attempt {attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {reason}");
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;

/// Default maximum attempts per item.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Upper bound on jitter added to a delay.
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,

    /// Failure that won't succeed regardless of retries.
    Permanent,

    /// Destination is locked by another writer.
    FileConflict,

    /// The run was cancelled.
    Cancelled,
}

/// Decision on whether to retry a failed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry behavior with exponential backoff.
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
/// ```
///
/// Jitter is at most a quarter of the capped delay and never above 500ms, so a zero
/// base delay retries immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with custom settings. `max_attempts` is clamped to 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Policy with the given attempt cap and base delay, other settings default.
    #[must_use]
    pub fn with_attempts_and_base(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Starts a fresh attempt counter bounded by this policy.
    #[must_use]
    pub fn start(&self) -> RetryState {
        RetryState {
            attempt: 0,
            max: self.max_attempts,
        }
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::FileConflict => {
                return RetryDecision::DoNotRetry {
                    reason: "destination locked by another writer".to_string(),
                };
            }
            FailureType::Cancelled => {
                return RetryDecision::DoNotRetry {
                    reason: "cancelled".to_string(),
                };
            }
            FailureType::Transient => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64) as u64;
        Duration::from_millis(capped_ms) + Self::calculate_jitter(capped_ms)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(capped_ms: u64) -> Duration {
        let ceiling = (capped_ms / 4).min(MAX_JITTER.as_millis() as u64);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
    }
}

/// Attempt counter for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    max: u32,
}

impl RetryState {
    /// Claims the next attempt number, or `None` once the cap is reached.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.attempt >= self.max {
            return None;
        }
        self.attempt += 1;
        Some(self.attempt)
    }

    /// Attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// Classifies a download error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Transport timeout / connection closed / connect | Transient |
/// | Incomplete body | Transient |
/// | Other transport errors (HTTP status, auth, bad URL) | Permanent |
/// | IO | Permanent |
/// | FileConflict | FileConflict |
/// | Cancelled | Cancelled |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::Transport(source) if source.is_retryable() => FailureType::Transient,
        DownloadError::Incomplete { .. } => FailureType::Transient,
        DownloadError::FileConflict { .. } => FailureType::FileConflict,
        DownloadError::Cancelled { .. } => FailureType::Cancelled,
        DownloadError::Transport(_) | DownloadError::Io { .. } | DownloadError::RetriesExhausted { .. } => {
            FailureType::Permanent
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(32));
    }

    #[test]
    fn test_max_attempts_minimum_is_one() {
        assert_eq!(RetryPolicy::with_attempts_and_base(0, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(32), 2.0);
        let first = policy.calculate_delay(1);
        assert!(first >= Duration::from_secs(1) && first <= Duration::from_millis(1250));
        let third = policy.calculate_delay(3);
        assert!(third >= Duration::from_secs(4) && third <= Duration::from_millis(4500));
    }

    #[test]
    fn test_delay_respects_max_delay() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        let delay = policy.calculate_delay(6);
        assert!(delay >= Duration::from_secs(5));
        assert!(delay <= Duration::from_millis(5500));
    }

    #[test]
    fn test_zero_base_delay_has_no_jitter() {
        let policy = RetryPolicy::with_attempts_and_base(4, Duration::ZERO);
        for attempt in 1..4 {
            assert_eq!(policy.calculate_delay(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn test_transient_retries_until_cap() {
        let policy = RetryPolicy::with_attempts_and_base(3, Duration::ZERO);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 2),
            RetryDecision::Retry { attempt: 3, .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 3),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_non_transient_never_retries() {
        let policy = RetryPolicy::default();
        for failure in [FailureType::Permanent, FailureType::FileConflict, FailureType::Cancelled] {
            assert!(matches!(
                policy.should_retry(failure, 1),
                RetryDecision::DoNotRetry { .. }
            ));
        }
    }

    #[test]
    fn test_retry_state_is_bounded() {
        let mut state = RetryPolicy::with_attempts_and_base(2, Duration::ZERO).start();
        assert_eq!(state.next_attempt(), Some(1));
        assert_eq!(state.next_attempt(), Some(2));
        assert_eq!(state.next_attempt(), None);
        assert_eq!(state.attempts(), 2);
    }

    #[test]
    fn test_classify_transport_errors() {
        let url = "https://media.example/a.jpg";
        assert_eq!(
            classify_error(&DownloadError::Transport(TransportError::timeout(url))),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&DownloadError::Transport(TransportError::status(url, 503))),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&DownloadError::Transport(TransportError::status(url, 403))),
            FailureType::Permanent
        );
    }

    #[test]
    fn test_classify_local_errors() {
        let io = std::io::Error::other("disk");
        assert_eq!(
            classify_error(&DownloadError::io("/tmp/a", io)),
            FailureType::Permanent
        );
        let locked = std::io::Error::new(std::io::ErrorKind::WouldBlock, "locked");
        assert_eq!(
            classify_error(&DownloadError::file_conflict("/tmp/a", locked)),
            FailureType::FileConflict
        );
        assert_eq!(
            classify_error(&DownloadError::incomplete("u", 10, 3)),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&DownloadError::cancelled("u")),
            FailureType::Cancelled
        );
    }
}
