//! Fixed-delay throttle for registry requests.
//!
//! Crossref is queried once per search result, sequentially. Waiting a fixed
//! delay before every call keeps the pipeline well below the public rate
//! limit without tracking response headers.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use alertminer_core::doi::Throttle;
//!
//! # async fn example() {
//! let throttle = Throttle::fixed(Duration::from_millis(10));
//! throttle.acquire().await; // waits 10 ms
//! # }
//! ```

use std::time::Duration;

use tracing::{instrument, trace};

/// Default delay before each registry call (5 seconds).
pub const DEFAULT_THROTTLE_DELAY: Duration = Duration::from_secs(5);

/// Sleeps a fixed delay before every call it guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    delay: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::fixed(DEFAULT_THROTTLE_DELAY)
    }
}

impl Throttle {
    /// Creates a throttle that waits `delay` before each call.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// Creates a throttle that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// Returns the configured delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns true when no delay is applied.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.delay.is_zero()
    }

    /// Waits the configured delay.
    #[instrument(skip(self), fields(delay_ms = self.delay.as_millis()))]
    pub async fn acquire(&self) {
        if self.is_disabled() {
            return;
        }
        trace!("throttling registry call");
        tokio::time::sleep(self.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_default_throttle_is_five_seconds() {
        assert_eq!(Throttle::default().delay(), Duration::from_secs(5));
        assert!(!Throttle::default().is_disabled());
    }

    #[tokio::test]
    async fn test_disabled_throttle_does_not_wait() {
        tokio::time::pause();

        let throttle = Throttle::disabled();
        let start = Instant::now();
        throttle.acquire().await;
        throttle.acquire().await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_fixed_throttle_waits_before_every_call() {
        tokio::time::pause();

        let throttle = Throttle::fixed(Duration::from_secs(5));
        let start = Instant::now();

        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(5));

        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_millis(10_100));
    }
}
