//! Per-request policy configuration.

use std::time::Duration;

/// Staleness and retry policy for a request.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use resync_core::QueryOptions;
///
/// let options = QueryOptions {
///     stale_time: Duration::from_secs(60),
///     retry_limit: 2,
///     ..QueryOptions::default()
/// };
/// assert_eq!(options.retry_limit, 2);
/// ```
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Duration after which fetched data is considered stale and refetched
    /// on next access (default: zero, data is stale as soon as it lands).
    pub stale_time: Duration,
    /// Maximum number of retries after a retryable failure (default: 3).
    /// A fetch failing `retry_limit` times in a row makes `retry_limit + 1`
    /// attempts in total.
    pub retry_limit: u32,
    /// Base delay before the first retry (default: 100ms).
    pub retry_backoff: Duration,
    /// Backoff multiplier applied per retry (default: 2.0).
    pub backoff_multiplier: f64,
    /// Upper bound on the backoff delay (default: 30s).
    pub max_backoff: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            retry_limit: 3,
            retry_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl QueryOptions {
    /// Returns the backoff delay before retry number `retry` (zero-based).
    ///
    /// Delays are non-decreasing and capped at `max_backoff`. Computed in
    /// `f64` seconds and capped before converting back, so a large retry
    /// count cannot overflow `Duration`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powf(f64::from(retry)).max(1.0);
        let secs = (self.retry_backoff.as_secs_f64() * factor).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}
