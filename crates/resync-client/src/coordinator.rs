//! Fetch coordination: deduplication, retry, cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use resync_core::{FetchError, Fetcher, QueryOptions, RequestKey};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::metrics::SyncMetrics;
use crate::store::CacheStore;

type FlightOutcome<V> = Option<Result<Arc<V>, FetchError>>;

/// An in-flight fetch for one key.
struct Flight<V> {
    rx: watch::Receiver<FlightOutcome<V>>,
    waiters: Arc<AtomicUsize>,
    /// Pinned flights (invalidation refetches) are never aborted by waiter
    /// bookkeeping.
    pinned: bool,
    generation: u64,
    task: JoinHandle<()>,
}

/// Issues fetches and maintains the dedup invariant: at most one underlying
/// fetch operation exists per request key at any time.
///
/// Concurrent requests for the same key join the existing flight and share
/// its result. Failed fetches are retried with exponential backoff up to the
/// configured limit before the error settles. Each flight carries the cache
/// entry's fetch generation; a completion whose generation has been
/// superseded is discarded by the store.
///
/// Cancellation is reference counted: dropping a [`FetchHandle`] withdraws
/// that caller's interest, and when the last waiter is gone the flight is
/// aborted and the entry rolled back.
pub struct FetchCoordinator<V> {
    store: Arc<CacheStore<V>>,
    flights: Arc<Mutex<HashMap<RequestKey, Flight<V>>>>,
    fetchers: RwLock<HashMap<RequestKey, Arc<dyn Fetcher<V>>>>,
    defaults: QueryOptions,
    metrics: SyncMetrics,
}

impl<V: Clone + Send + Sync + 'static> FetchCoordinator<V> {
    /// Creates a coordinator over the given store.
    pub fn new(store: Arc<CacheStore<V>>, defaults: QueryOptions, metrics: SyncMetrics) -> Self {
        Self {
            store,
            flights: Arc::new(Mutex::new(HashMap::new())),
            fetchers: RwLock::new(HashMap::new()),
            defaults,
            metrics,
        }
    }

    /// Remembers the fetcher for a key, so invalidation events can refetch
    /// it without the original caller present.
    pub fn register_fetcher(&self, key: &RequestKey, fetcher: Arc<dyn Fetcher<V>>) {
        self.fetchers.write().insert(key.clone(), fetcher);
    }

    /// Returns the registered fetcher for a key, if any.
    pub fn fetcher(&self, key: &RequestKey) -> Option<Arc<dyn Fetcher<V>>> {
        self.fetchers.read().get(key).cloned()
    }

    /// Issues (or joins) a fetch for the key using its registered fetcher.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::NoFetcher` if no fetcher has been registered for
    /// the key.
    pub fn request(
        &self,
        key: &RequestKey,
        options: &QueryOptions,
    ) -> Result<FetchHandle<V>, FetchError> {
        let fetcher = self
            .fetcher(key)
            .ok_or_else(|| FetchError::NoFetcher(key.to_string()))?;
        Ok(self.request_with(key, fetcher, options))
    }

    /// Issues a fetch with an explicit fetcher, or joins the flight already
    /// in progress for the key.
    pub fn request_with(
        &self,
        key: &RequestKey,
        fetcher: Arc<dyn Fetcher<V>>,
        options: &QueryOptions,
    ) -> FetchHandle<V> {
        self.start_flight(key, fetcher, options, false)
            .expect("non-pinned flights always produce a handle")
    }

    /// Spawns a detached refetch for the key using its registered fetcher.
    ///
    /// Detached flights are pinned: they run to completion even with no
    /// waiters. Returns false if no fetcher is registered. Joining an
    /// already in-flight fetch counts as success.
    pub fn spawn_refetch(&self, key: &RequestKey) -> bool {
        let Some(fetcher) = self.fetcher(key) else {
            return false;
        };
        let options = self.defaults.clone();
        self.start_flight(key, fetcher, &options, true);
        true
    }

    /// Refetches every cached key matching the pattern that has a registered
    /// fetcher. Returns the number of refetches spawned.
    pub fn refetch_matching(&self, pattern: &resync_core::KeyPattern) -> usize {
        let keys = self.store.keys_matching(pattern);
        let mut spawned = 0;
        for key in keys {
            if self.spawn_refetch(&key) {
                spawned += 1;
            }
        }
        debug!(pattern = %pattern, count = spawned, "Refetches spawned for invalidation");
        spawned
    }

    /// Returns the number of fetches currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.flights.lock().len()
    }

    /// Aborts every in-flight fetch and rolls its entry back. Used on
    /// client teardown.
    pub fn abort_all(&self) {
        let drained: Vec<(RequestKey, Flight<V>)> = self.flights.lock().drain().collect();
        for (key, flight) in drained {
            flight.task.abort();
            self.store.cancel_fetch(&key, flight.generation);
        }
        self.fetchers.write().clear();
    }

    /// Joins the existing flight for the key or starts a new one.
    ///
    /// Returns `None` only for pinned starts that joined an existing flight.
    fn start_flight(
        &self,
        key: &RequestKey,
        fetcher: Arc<dyn Fetcher<V>>,
        options: &QueryOptions,
        pinned: bool,
    ) -> Option<FetchHandle<V>> {
        let mut flights = self.flights.lock();

        if let Some(flight) = flights.get_mut(key) {
            flight.pinned |= pinned;
            if pinned {
                return None;
            }
            flight.waiters.fetch_add(1, Ordering::AcqRel);
            self.metrics.record_deduplicated();
            debug!(key = %key, "Joined in-flight fetch");
            return Some(self.handle_for(key, flight));
        }

        // New flight. The flights lock is held across the generation bump so
        // a concurrent request cannot start a second fetch for the same key.
        // The pending notification runs only after the lock is released:
        // subscriber callbacks may re-enter the coordinator.
        let (generation, snapshot) = self.store.begin_fetch_deferred(key);
        let (tx, rx) = watch::channel(None);
        let waiters = Arc::new(AtomicUsize::new(if pinned { 0 } else { 1 }));

        let task = tokio::spawn(run_flight(
            Arc::clone(&self.store),
            Arc::clone(&self.flights),
            key.clone(),
            generation,
            fetcher,
            options.clone(),
            self.metrics.clone(),
            tx,
        ));

        let flight = Flight {
            rx,
            waiters,
            pinned,
            generation,
            task,
        };
        let handle = (!pinned).then(|| self.handle_for(key, &flight));
        flights.insert(key.clone(), flight);
        drop(flights);

        self.store.registry().notify(key, &snapshot);
        debug!(key = %key, generation = generation, pinned = pinned, "Fetch started");
        handle
    }

    fn handle_for(&self, key: &RequestKey, flight: &Flight<V>) -> FetchHandle<V> {
        FetchHandle {
            key: key.clone(),
            generation: flight.generation,
            rx: flight.rx.clone(),
            waiters: Arc::clone(&flight.waiters),
            flights: Arc::clone(&self.flights),
            store: Arc::clone(&self.store),
            metrics: self.metrics.clone(),
            settled: false,
        }
    }
}

/// Runs one flight to completion: fetch, retry with backoff, write the
/// outcome to the store, publish it to waiters.
#[allow(clippy::too_many_arguments)]
async fn run_flight<V: Clone + Send + Sync + 'static>(
    store: Arc<CacheStore<V>>,
    flights: Arc<Mutex<HashMap<RequestKey, Flight<V>>>>,
    key: RequestKey,
    generation: u64,
    fetcher: Arc<dyn Fetcher<V>>,
    options: QueryOptions,
    metrics: SyncMetrics,
    tx: watch::Sender<FlightOutcome<V>>,
) {
    let start = Instant::now();
    let mut retries = 0u32;

    let result = loop {
        metrics.record_fetch_attempt();
        match fetcher.fetch(&key).await {
            Ok(value) => break Ok(Arc::new(value)),
            Err(error) if error.is_retryable() && retries < options.retry_limit => {
                let delay = options.backoff_delay(retries);
                warn!(
                    key = %key,
                    fetcher = fetcher.name(),
                    error = %error,
                    retry = retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Fetch failed, retrying"
                );
                metrics.record_retry();
                tokio::time::sleep(delay).await;
                retries += 1;
            },
            Err(error) => break Err(error),
        }
    };

    match &result {
        Ok(value) => {
            store.complete_success(&key, generation, Arc::clone(value));
            metrics.record_fetch_duration("success", start.elapsed());
            debug!(key = %key, "Fetch resolved");
        },
        Err(error) => {
            store.complete_error(&key, generation, error.clone());
            metrics.record_fetch_duration("error", start.elapsed());
            warn!(key = %key, error = %error, "Fetch settled with error");
        },
    }

    // Publish before unregistering so a caller joining right now still
    // receives the outcome through its handle.
    let _ = tx.send(Some(result));

    let mut flights = flights.lock();
    if flights
        .get(&key)
        .is_some_and(|flight| flight.generation == generation)
    {
        flights.remove(&key);
    }
}

/// Await-able handle to an in-flight (or joined) fetch.
///
/// Dropping the handle without awaiting withdraws this caller's interest;
/// when the last waiter is gone the underlying fetch is aborted and the
/// cache entry rolled back, so an abandoned request never settles the entry
/// with a result nobody asked for.
pub struct FetchHandle<V: Clone + Send + Sync + 'static> {
    key: RequestKey,
    generation: u64,
    rx: watch::Receiver<FlightOutcome<V>>,
    waiters: Arc<AtomicUsize>,
    flights: Arc<Mutex<HashMap<RequestKey, Flight<V>>>>,
    store: Arc<CacheStore<V>>,
    metrics: SyncMetrics,
    settled: bool,
}

impl<V: Clone + Send + Sync + 'static> FetchHandle<V> {
    /// Returns the key this handle is waiting on.
    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    /// Waits for the flight to settle and returns its outcome.
    ///
    /// Returns `FetchError::Cancelled` if the flight was aborted before
    /// settling (every other waiter cancelled and the abort raced this one).
    pub async fn wait(mut self) -> Result<Arc<V>, FetchError> {
        loop {
            let outcome = self.rx.borrow().clone();
            if let Some(result) = outcome {
                self.settle();
                return result;
            }
            if self.rx.changed().await.is_err() {
                self.settle();
                return Err(FetchError::Cancelled);
            }
        }
    }

    /// Withdraws this caller's interest in the fetch.
    pub fn cancel(self) {}

    fn settle(&mut self) {
        self.settled = true;
        self.waiters.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<V: Clone + Send + Sync + 'static> Drop for FetchHandle<V> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let remaining = self.waiters.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining > 0 {
            return;
        }

        // Last waiter gone. Re-check under the flights lock: a new caller
        // may have joined between the decrement and here.
        let mut flights = self.flights.lock();
        let should_abort = flights.get(&self.key).is_some_and(|flight| {
            flight.generation == self.generation
                && !flight.pinned
                && flight.waiters.load(Ordering::Acquire) == 0
        });
        if !should_abort {
            return;
        }

        let flight = flights
            .remove(&self.key)
            .expect("flight checked under lock");
        flight.task.abort();
        drop(flights);

        if self.store.cancel_fetch(&self.key, self.generation) {
            self.metrics.record_cancellation();
            debug!(key = %self.key, "Fetch aborted, all waiters cancelled");
        }
    }
}
