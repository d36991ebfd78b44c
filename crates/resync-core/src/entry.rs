//! Cache entry state tracking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::FetchError;

/// Lifecycle status of a cache entry.
///
/// Transitions are `idle -> pending -> {success, error}`. Settled states are
/// re-enterable: an invalidation or refetch moves the entry back to `pending`
/// without clearing previously fetched data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// No fetch has been issued yet.
    Idle,
    /// A fetch is in flight.
    Pending,
    /// The last fetch completed with data.
    Success,
    /// The last fetch settled with an error.
    Error,
}

impl FetchStatus {
    /// Returns the status as a static string, for logging and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// A single cached result and its request lifecycle metadata.
///
/// Entries are owned by the cache store and mutated only on request
/// lifecycle transitions. Data survives refetches and errors: a `pending` or
/// `error` entry keeps its last successful value readable
/// (stale-while-revalidate, non-destructive failure).
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    data: Option<Arc<V>>,
    status: FetchStatus,
    error: Option<FetchError>,
    updated_at: Option<Instant>,
    last_accessed: Instant,
    stale: bool,
    generation: u64,
}

impl<V> CacheEntry<V> {
    /// Creates a new idle entry with no data.
    pub fn new() -> Self {
        Self {
            data: None,
            status: FetchStatus::Idle,
            error: None,
            updated_at: None,
            last_accessed: Instant::now(),
            stale: false,
            generation: 0,
        }
    }

    /// Returns the cached data, if any has ever been fetched.
    pub fn data(&self) -> Option<Arc<V>> {
        self.data.clone()
    }

    /// Returns the current lifecycle status.
    pub fn status(&self) -> FetchStatus {
        self.status
    }

    /// Returns the error from the last settled fetch, if any.
    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    /// Returns the time of the last successful fetch.
    pub fn updated_at(&self) -> Option<Instant> {
        self.updated_at
    }

    /// Returns the time of the last read, for eviction ordering.
    pub fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    /// Returns true if the entry has been explicitly invalidated.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Returns the generation of the most recently issued fetch.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true if the entry holds data considered fresh under the given
    /// staleness window.
    ///
    /// Invalidated entries are never fresh, regardless of age.
    pub fn is_fresh(&self, stale_time: Duration) -> bool {
        if self.stale || self.data.is_none() {
            return false;
        }
        match self.updated_at {
            Some(updated_at) => updated_at.elapsed() < stale_time,
            None => false,
        }
    }

    /// Records a read access.
    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }

    /// Begins a new fetch: bumps the generation and enters `pending`.
    ///
    /// Prior data is retained so it stays readable while the fetch is in
    /// flight. Returns the new generation; completions carrying an older
    /// generation must be discarded.
    pub fn begin_fetch(&mut self) -> u64 {
        self.generation += 1;
        self.status = FetchStatus::Pending;
        self.generation
    }

    /// Completes the fetch of the given generation with data.
    ///
    /// Returns false if a newer fetch has superseded this completion, in
    /// which case the entry is left untouched.
    pub fn complete_success(&mut self, generation: u64, value: Arc<V>) -> bool {
        if generation != self.generation || self.status != FetchStatus::Pending {
            return false;
        }
        self.data = Some(value);
        self.status = FetchStatus::Success;
        self.error = None;
        self.updated_at = Some(Instant::now());
        self.stale = false;
        true
    }

    /// Settles the fetch of the given generation with an error.
    ///
    /// Prior data is retained alongside the error. Returns false if a newer
    /// fetch has superseded this completion.
    pub fn complete_error(&mut self, generation: u64, error: FetchError) -> bool {
        if generation != self.generation || self.status != FetchStatus::Pending {
            return false;
        }
        self.status = FetchStatus::Error;
        self.error = Some(error);
        true
    }

    /// Rolls back a cancelled fetch of the given generation.
    ///
    /// The entry returns to `success` if it still holds data, `idle`
    /// otherwise. Returns false if a newer fetch has superseded the
    /// cancelled one.
    pub fn cancel_fetch(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.status != FetchStatus::Pending {
            return false;
        }
        self.status = if self.data.is_some() {
            FetchStatus::Success
        } else {
            FetchStatus::Idle
        };
        true
    }

    /// Marks the entry stale without deleting its data.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }
}

impl<V> Default for CacheEntry<V> {
    fn default() -> Self {
        Self::new()
    }
}
