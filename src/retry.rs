//! Bounded retries for calls to the extraction service.
//!
//! A failed call is mapped to a [`FailureType`]; [`RetryPolicy::should_retry`]
//! turns that and the attempt number into a [`RetryDecision`]. Transient and
//! rate-limited failures are retried with exponential backoff plus jitter
//! until the attempt budget (3 by default) is spent. Permanent and
//! credential failures stop immediately.
//!
//! ```
//! use alertminer_core::retry::{FailureType, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! assert!(matches!(
//!     policy.should_retry(FailureType::Transient, 1),
//!     RetryDecision::Retry { attempt: 2, .. }
//! ));
//! assert!(matches!(
//!     policy.should_retry(FailureType::NeedsAuth, 1),
//!     RetryDecision::DoNotRetry { .. }
//! ));
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

/// Default maximum attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Longest server-requested wait honoured.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// How a failed extraction call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Network errors, 5xx answers and unparseable model output.
    Transient,

    /// Rejected requests and invalid schemas.
    Permanent,

    /// Credentials missing or rejected (401/403).
    NeedsAuth,

    /// Service rate limiting (HTTP 429).
    RateLimited,
}

/// Outcome of [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make attempt number `attempt` (1-indexed).
    Retry { delay: Duration, attempt: u32 },

    /// Give up; `reason` is logged.
    DoNotRetry { reason: String },
}

/// Attempt budget and backoff schedule.
///
/// The wait after failed attempt `n` is
/// `min(base_delay * multiplier^(n - 1), max_delay)` plus up to `max_jitter`
/// of random jitter. Defaults: 3 attempts, 1 s base, 32 s cap, doubling,
/// 500 ms jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// `max_attempts` is clamped to at least 1.
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
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Creates a policy that retries without waiting. Used by tests and dry runs.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO, 1.0).without_jitter()
    }

    /// Disables jitter.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry a failed call.
    ///
    /// `attempt` is the attempt number that just failed (1-indexed).
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::NeedsAuth => {
                return RetryDecision::DoNotRetry {
                    reason: "credentials rejected - check the configured API key".to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
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

    /// Calculates the delay for a retry attempt with exponential backoff and jitter.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);

        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);

        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..=max_ms))
    }
}

/// Classifies an HTTP status code into a failure type.
#[allow(clippy::match_same_arms)]
#[must_use]
pub fn classify_http_status(status: u16) -> FailureType {
    match status {
        400 => FailureType::Permanent,   // Bad Request
        401 => FailureType::NeedsAuth,   // Unauthorized
        403 => FailureType::NeedsAuth,   // Forbidden
        404 => FailureType::Permanent,   // Not Found
        408 => FailureType::Transient,   // Request Timeout
        409 => FailureType::Transient,   // Conflict (overloaded model backends)
        429 => FailureType::RateLimited, // Too Many Requests

        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,

        _ => FailureType::Permanent,
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports integer seconds and HTTP-dates (RFC 7231). Returns `None` if the
/// value cannot be parsed; caps excessive values at five minutes.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use alertminer_core::retry::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<u64>() {
        let duration = Duration::from_secs(seconds);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    let datetime = httpdate::parse_http_date(header_value).ok()?;
    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
        Err(_) => Some(Duration::ZERO),
    }
}
