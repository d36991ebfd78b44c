//! Error types for the data-synchronization layer.

/// Errors produced while issuing or resolving fetch operations.
///
/// The taxonomy drives retry behavior: transport-level failures are retried
/// up to the configured limit, validation failures surface immediately, and
/// cancellation is never surfaced as a failure to remaining subscribers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// A transport-level failure. Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// The operation timed out. Retryable.
    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The response was malformed. Not retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The caller withdrew interest before the fetch settled.
    #[error("request cancelled")]
    Cancelled,

    /// No fetcher has been registered for the requested key.
    #[error("no fetcher registered for key: {0}")]
    NoFetcher(String),

    /// A request key could not be constructed.
    #[error("invalid request key: {0}")]
    InvalidKey(String),

    /// An invalidation pattern could not be parsed.
    #[error("invalid key pattern: {0}")]
    InvalidPattern(String),
}

impl FetchError {
    /// Creates a new network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a new validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout { .. })
    }
}
