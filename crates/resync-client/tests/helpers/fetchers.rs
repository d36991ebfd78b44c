//! Instrumented fetchers for integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use resync_core::{FetchError, Fetcher, RequestKey};
// tokio's Instant respects paused test time, std's does not
use tokio::time::Instant;

/// Succeeds with `"<prefix>:<n>"` where `n` is the attempt number, after an
/// optional simulated latency. Counts every underlying invocation.
pub struct CountingFetcher {
    prefix: String,
    delay: Duration,
    calls: Arc<AtomicU32>,
}

impl CountingFetcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Fetcher<String> for CountingFetcher {
    async fn fetch(&self, _key: &RequestKey) -> Result<String, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(format!("{}:{}", self.prefix, n))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Fails with a retryable network error `failures` times, then succeeds.
/// Records the instant of every attempt so tests can assert backoff spacing.
pub struct FlakyFetcher {
    failures: u32,
    calls: Arc<AtomicU32>,
    attempt_times: Arc<Mutex<Vec<Instant>>>,
}

impl FlakyFetcher {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: Arc::new(AtomicU32::new(0)),
            attempt_times: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }

    pub fn attempt_times(&self) -> Arc<Mutex<Vec<Instant>>> {
        Arc::clone(&self.attempt_times)
    }
}

#[async_trait]
impl Fetcher<String> for FlakyFetcher {
    async fn fetch(&self, _key: &RequestKey) -> Result<String, FetchError> {
        self.attempt_times.lock().push(Instant::now());
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            Err(FetchError::network(format!("simulated failure {}", n)))
        } else {
            Ok(format!("recovered after {} failures", n - 1))
        }
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Always fails. `retryable` selects between a network and a validation
/// error.
pub struct FailingFetcher {
    retryable: bool,
    calls: Arc<AtomicU32>,
}

impl FailingFetcher {
    pub fn retryable() -> Self {
        Self {
            retryable: true,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn fatal() -> Self {
        Self {
            retryable: false,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Fetcher<String> for FailingFetcher {
    async fn fetch(&self, _key: &RequestKey) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.retryable {
            Err(FetchError::network("always down"))
        } else {
            Err(FetchError::validation("always malformed"))
        }
    }

    fn name(&self) -> &str {
        "failing"
    }
}
