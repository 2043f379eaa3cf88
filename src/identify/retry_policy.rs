//! Retry policy for failed pipeline runs.
//!
//! Defaults to a fixed inter-attempt delay; the multiplier can be raised in
//! configuration for exponential backoff. Give-up is bounded either way.

use crate::config::IdentifySettings;
use crate::identify::models::IdentifyError;

/// Retry policy for re-queueing failed identification tasks.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of pipeline attempts before permanent failure.
    pub max_attempts: i32,
    /// Base delay between attempts in seconds.
    pub base_delay_secs: u64,
    /// Maximum delay in seconds (cap when the multiplier is above 1).
    pub max_delay_secs: u64,
    /// Multiplier applied to the delay after each retry.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Create a new RetryPolicy from configuration settings.
    pub fn new(config: &IdentifySettings) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_secs: config.retry_delay_secs,
            max_delay_secs: config.max_retry_delay_secs,
            multiplier: config.retry_multiplier,
        }
    }

    /// Check if a failed attempt should be retried.
    ///
    /// Returns true if the error kind is retryable and fewer than
    /// `max_attempts` attempts have been made. Non-retryable kinds give up
    /// immediately regardless of the attempt count.
    pub fn should_retry(&self, error: &IdentifyError, attempts_made: i32) -> bool {
        error.is_retryable() && attempts_made < self.max_attempts
    }

    /// Delay in seconds before retry number `retry_count` (0-based).
    ///
    /// `base_delay * multiplier^retry_count`, capped at `max_delay_secs`.
    pub fn delay_secs(&self, retry_count: i32) -> u64 {
        let delay = self.base_delay_secs as f64 * self.multiplier.powi(retry_count);
        delay.min(self.max_delay_secs as f64) as u64
    }

    /// Unix timestamp at which the next retry becomes due.
    pub fn next_retry_at(&self, retry_count: i32) -> i64 {
        chrono::Utc::now().timestamp() + self.delay_secs(retry_count) as i64
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 5,
            max_delay_secs: 300,
            multiplier: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identify::models::ErrorKind;

    #[test]
    fn test_new_from_config() {
        let config = IdentifySettings::default();
        let policy = RetryPolicy::new(&config);

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_secs, 5);
        assert_eq!(policy.max_delay_secs, 300);
        assert_eq!(policy.multiplier, 1.0);
    }

    #[test]
    fn test_fixed_delay_by_default() {
        let policy = RetryPolicy::default();

        // Multiplier 1.0: every retry waits the base delay.
        assert_eq!(policy.delay_secs(0), 5);
        assert_eq!(policy.delay_secs(1), 5);
        assert_eq!(policy.delay_secs(7), 5);
    }

    #[test]
    fn test_exponential_delay_when_configured() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_secs: 5,
            max_delay_secs: 3600,
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_secs(0), 5);
        assert_eq!(policy.delay_secs(1), 10);
        assert_eq!(policy.delay_secs(2), 20);
        assert_eq!(policy.delay_secs(3), 40);
    }

    #[test]
    fn test_delay_capping() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_secs: 60,
            max_delay_secs: 300,
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_secs(2), 240);
        // 60 * 2^3 = 480 -> capped at 300
        assert_eq!(policy.delay_secs(3), 300);
        assert_eq!(policy.delay_secs(6), 300);
    }

    #[test]
    fn test_next_retry_at() {
        let policy = RetryPolicy::default();
        let now = chrono::Utc::now().timestamp();

        let retry_at = policy.next_retry_at(0);
        assert!(retry_at >= now + 4 && retry_at <= now + 6);
    }

    #[test]
    fn test_should_retry_retryable_kinds() {
        let policy = RetryPolicy::default();

        let network = IdentifyError::new(ErrorKind::NetworkError, "connection refused");
        let rate = IdentifyError::new(ErrorKind::RateLimited, "throttled");
        let download = IdentifyError::new(ErrorKind::DownloadError, "fetch failed");
        let processing = IdentifyError::new(ErrorKind::ProcessingError, "unexpected");

        assert!(policy.should_retry(&network, 1));
        assert!(policy.should_retry(&rate, 1));
        assert!(policy.should_retry(&download, 2));
        assert!(policy.should_retry(&processing, 2));
    }

    #[test]
    fn test_should_retry_non_retryable_gives_up_immediately() {
        let policy = RetryPolicy::default();

        for kind in [
            ErrorKind::InvalidUrl,
            ErrorKind::ContentNotFound,
            ErrorKind::PrivateAccount,
            ErrorKind::AuthError,
            ErrorKind::NoSongFound,
        ] {
            let err = IdentifyError::new(kind, "nope");
            assert!(!policy.should_retry(&err, 1), "{kind} must not retry");
        }
    }

    #[test]
    fn test_should_retry_attempt_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };

        let err = IdentifyError::new(ErrorKind::NetworkError, "connection refused");

        // Attempts 1 and 2 made: more attempts remain.
        assert!(policy.should_retry(&err, 1));
        assert!(policy.should_retry(&err, 2));

        // Ceiling reached: give up.
        assert!(!policy.should_retry(&err, 3));
        assert!(!policy.should_retry(&err, 10));
    }
}
