//! Consumer-facing resource handle.

use std::sync::Arc;

use resync_core::{FetchError, FetchStatus, Fetcher, QueryOptions, RequestKey};

use crate::coordinator::FetchCoordinator;
use crate::store::CacheStore;
use crate::subscription::{SubscriberFn, SubscriptionHandle, SubscriptionRegistry};

/// Point-in-time view of a resource: last-known data, lifecycle status, and
/// the error from the last settled fetch, if any.
///
/// Data and error can coexist: a failed refetch leaves the previous data
/// readable so a consumer can render last-known-good state with an error
/// indicator.
#[derive(Debug, Clone)]
pub struct ResourceState<V> {
    pub data: Option<Arc<V>>,
    pub status: FetchStatus,
    pub error: Option<FetchError>,
}

impl<V> Default for ResourceState<V> {
    fn default() -> Self {
        Self {
            data: None,
            status: FetchStatus::Idle,
            error: None,
        }
    }
}

/// A consumer's handle on one request key.
///
/// Created through [`SyncClient::resource`](crate::client::SyncClient::resource).
/// Reads go through the cache with stale-while-revalidate semantics;
/// [`subscribe`](Self::subscribe) delivers every state change so a UI layer
/// can re-render on updates.
pub struct Resource<V> {
    key: RequestKey,
    store: Arc<CacheStore<V>>,
    coordinator: Arc<FetchCoordinator<V>>,
    registry: Arc<SubscriptionRegistry<V>>,
    options: QueryOptions,
}

impl<V: Clone + Send + Sync + 'static> Resource<V> {
    pub(crate) fn new(
        key: RequestKey,
        store: Arc<CacheStore<V>>,
        coordinator: Arc<FetchCoordinator<V>>,
        registry: Arc<SubscriptionRegistry<V>>,
        fetcher: Arc<dyn Fetcher<V>>,
        options: QueryOptions,
    ) -> Self {
        coordinator.register_fetcher(&key, fetcher);
        Self {
            key,
            store,
            coordinator,
            registry,
            options,
        }
    }

    /// Returns the request key this resource observes.
    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    /// Returns the current state snapshot without issuing a fetch.
    pub fn state(&self) -> ResourceState<V> {
        match self.store.peek(&self.key) {
            Some(entry) => ResourceState {
                data: entry.data(),
                status: entry.status(),
                error: entry.error().cloned(),
            },
            None => ResourceState::default(),
        }
    }

    /// Returns the cached data, if any.
    pub fn data(&self) -> Option<Arc<V>> {
        self.state().data
    }

    /// Returns the current lifecycle status.
    pub fn status(&self) -> FetchStatus {
        self.state().status
    }

    /// Returns the error from the last settled fetch, if any.
    pub fn error(&self) -> Option<FetchError> {
        self.state().error
    }

    /// Reads the resource with stale-while-revalidate semantics.
    ///
    /// - Fresh cached data is returned directly.
    /// - Stale cached data is returned immediately while a background
    ///   refetch revalidates it.
    /// - With nothing cached, the fetch (or the one already in flight) is
    ///   awaited.
    pub async fn fetch(&self) -> Result<Arc<V>, FetchError> {
        if let Some(entry) = self.store.get(&self.key) {
            if entry.is_fresh(self.options.stale_time) {
                return Ok(entry.data().expect("fresh entries hold data"));
            }

            if let Some(data) = entry.data() {
                if entry.status() != FetchStatus::Pending {
                    self.coordinator.spawn_refetch(&self.key);
                }
                return Ok(data);
            }
        }

        self.coordinator
            .request(&self.key, &self.options)?
            .wait()
            .await
    }

    /// Forces a refetch, bypassing freshness, and awaits the result.
    ///
    /// Joins the in-flight fetch if one exists.
    pub async fn refetch(&self) -> Result<Arc<V>, FetchError> {
        self.coordinator
            .request(&self.key, &self.options)?
            .wait()
            .await
    }

    /// Registers a callback invoked on every state change for this key.
    pub fn subscribe(&self, callback: SubscriberFn<V>) -> SubscriptionHandle<V> {
        self.registry.subscribe(&self.key, callback)
    }
}
