//! Retry policy for the request pipeline.
//!
//! How long to wait before retrying depends on where the failed attempt's
//! address came from:
//!
//! | mode     | blocked          | transport error  |
//! |----------|------------------|------------------|
//! | `Once`   | no wait          | no wait          |
//! | `Pooled` | 0.5 s to 1.5 s   | 0.5 s to 1.5 s   |
//! | `Direct` | 4 s to 7 s       | 2 s to 5 s       |

use rand::Rng;
use reqwest::StatusCode;
use std::ops::Range;
use std::time::Duration;

/// Anti-scraping status code returned by the platform.
pub const BLOCK_STATUS: u16 = 432;

/// Where the address used for an attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    /// A fresh proxy from the vending API, used for this attempt only.
    Once,
    /// A proxy selected from the pool.
    Pooled,
    /// No proxy, the request left from our own address.
    Direct,
}

/// Retryable outcome of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryable {
    /// The platform answered with its block status.
    Blocked,
    /// Connection error, timeout or another transport failure.
    Transient,
}

/// Strategy for retrying blocked and failed requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts per request.
    pub max_retries: usize,
    /// Status treated as the anti-scraping block.
    pub block_status: StatusCode,
    /// Delay range after a pooled proxy failed.
    pub pooled_backoff: Range<Duration>,
    /// Delay range after a direct request was blocked.
    pub direct_block_backoff: Range<Duration>,
    /// Delay range after a direct request hit a transport error.
    pub direct_transient_backoff: Range<Duration>,
}

impl RetryPolicy {
    /// Creates a policy with the default backoff tiers.
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            block_status: StatusCode::from_u16(BLOCK_STATUS)
                .unwrap_or(StatusCode::TOO_MANY_REQUESTS),
            pooled_backoff: Duration::from_millis(500)..Duration::from_millis(1500),
            direct_block_backoff: Duration::from_secs(4)..Duration::from_secs(7),
            direct_transient_backoff: Duration::from_secs(2)..Duration::from_secs(5),
        }
    }

    /// Sets the number of attempts.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the status treated as a block.
    pub fn with_block_status(mut self, status: StatusCode) -> Self {
        self.block_status = status;
        self
    }

    /// Sets the delay range used after pooled proxy failures.
    pub fn with_pooled_backoff(mut self, range: Range<Duration>) -> Self {
        self.pooled_backoff = range;
        self
    }

    /// Sets the delay ranges used after direct failures.
    pub fn with_direct_backoff(
        mut self,
        blocked: Range<Duration>,
        transient: Range<Duration>,
    ) -> Self {
        self.direct_block_backoff = blocked;
        self.direct_transient_backoff = transient;
        self
    }

    /// Delay before the next attempt.
    pub fn backoff(&self, mode: ProxyMode, outcome: Retryable) -> Duration {
        match (mode, outcome) {
            (ProxyMode::Once, _) => Duration::ZERO,
            (ProxyMode::Pooled, _) => jitter(&self.pooled_backoff),
            (ProxyMode::Direct, Retryable::Blocked) => jitter(&self.direct_block_backoff),
            (ProxyMode::Direct, Retryable::Transient) => jitter(&self.direct_transient_backoff),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

fn jitter(range: &Range<Duration>) -> Duration {
    if range.is_empty() {
        return range.start;
    }
    rand::rng().random_range(range.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.block_status.as_u16(), 432);
    }

    #[test]
    fn test_once_mode_never_waits() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(ProxyMode::Once, Retryable::Blocked), Duration::ZERO);
        assert_eq!(policy.backoff(ProxyMode::Once, Retryable::Transient), Duration::ZERO);
    }

    #[test]
    fn test_backoff_tiers_are_ordered() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let pooled = policy.backoff(ProxyMode::Pooled, Retryable::Blocked);
            assert!(pooled >= Duration::from_millis(500) && pooled < Duration::from_millis(1500));

            let blocked = policy.backoff(ProxyMode::Direct, Retryable::Blocked);
            assert!(blocked >= Duration::from_secs(4) && blocked < Duration::from_secs(7));

            let transient = policy.backoff(ProxyMode::Direct, Retryable::Transient);
            assert!(transient >= Duration::from_secs(2) && transient < Duration::from_secs(5));
        }
    }

    #[test]
    fn test_empty_range_uses_start() {
        let policy = RetryPolicy::default()
            .with_pooled_backoff(Duration::from_millis(10)..Duration::from_millis(10));
        assert_eq!(
            policy.backoff(ProxyMode::Pooled, Retryable::Transient),
            Duration::from_millis(10)
        );
    }
}
