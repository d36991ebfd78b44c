//! Client lifecycle and wiring.

use std::future::Future;
use std::sync::Arc;

use resync_core::{FetchError, Fetcher, KeyPattern, QueryOptions, RequestKey};
use tracing::{debug, info};

use crate::coordinator::FetchCoordinator;
use crate::invalidation::InvalidationBus;
use crate::metrics::SyncMetrics;
use crate::resource::Resource;
use crate::store::{CacheStore, InvalidationResult, StoreConfig};
use crate::subscription::SubscriptionRegistry;

/// Configuration for a [`SyncClient`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Cache store settings.
    pub store: StoreConfig,
    /// Default per-request policy, overridable per resource.
    pub query: QueryOptions,
}

/// The data-synchronization layer, assembled.
///
/// One client owns a cache store, a fetch coordinator, a subscription
/// registry, and an invalidation bus, wired so that published invalidation
/// patterns mark matching entries stale and refetch the ones with a known
/// fetcher. The client is an explicit process-scoped object: create it with
/// [`new`](Self::new), inject it into consumers, and call
/// [`dispose`](Self::dispose) on teardown. Nothing survives the instance; no
/// persistence is attempted.
///
/// # Example
///
/// ```ignore
/// use resync_client::{ClientConfig, SyncClient};
/// use resync_core::{fetch_fn, KeyPattern, RequestKey};
///
/// let client: SyncClient<User> = SyncClient::new(ClientConfig::default());
///
/// let user = client.resource(
///     RequestKey::with_params("user", &UserParams { id: 1 })?,
///     Arc::new(fetch_fn("user-api", fetch_user)),
///     None,
/// );
/// let data = user.fetch().await?;
///
/// // A mutation invalidates every cached "user" key on success
/// client
///     .mutate(|| update_user(1, "new name"), &[KeyPattern::operation("user")])
///     .await?;
/// ```
pub struct SyncClient<V> {
    store: Arc<CacheStore<V>>,
    registry: Arc<SubscriptionRegistry<V>>,
    coordinator: Arc<FetchCoordinator<V>>,
    bus: InvalidationBus,
    defaults: QueryOptions,
}

impl<V: Clone + Send + Sync + 'static> SyncClient<V> {
    /// Creates a client and spawns its invalidation dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ClientConfig) -> Self {
        let metrics = SyncMetrics::new();
        let registry = Arc::new(SubscriptionRegistry::new());
        let store = Arc::new(CacheStore::new(
            config.store,
            Arc::clone(&registry),
            metrics.clone(),
        ));
        let coordinator = Arc::new(FetchCoordinator::new(
            Arc::clone(&store),
            config.query.clone(),
            metrics,
        ));

        let bus = InvalidationBus::new();
        {
            let store = Arc::clone(&store);
            let coordinator = Arc::clone(&coordinator);
            bus.on_invalidate(Arc::new(move |pattern: &KeyPattern| {
                store.invalidate(pattern);
                coordinator.refetch_matching(pattern);
            }));
        }

        info!("Sync client created");

        Self {
            store,
            registry,
            coordinator,
            bus,
            defaults: config.query,
        }
    }

    /// Creates a consumer handle for one request key.
    ///
    /// The fetcher is registered with the coordinator so later invalidation
    /// events can refetch the key without this resource present. `options`
    /// falls back to the client-wide defaults.
    pub fn resource(
        &self,
        key: RequestKey,
        fetcher: Arc<dyn Fetcher<V>>,
        options: Option<QueryOptions>,
    ) -> Resource<V> {
        Resource::new(
            key,
            Arc::clone(&self.store),
            Arc::clone(&self.coordinator),
            Arc::clone(&self.registry),
            fetcher,
            options.unwrap_or_else(|| self.defaults.clone()),
        )
    }

    /// Runs a mutation; on success, publishes the given invalidation
    /// patterns on the bus.
    ///
    /// Publication is fire-and-forget: the mutation's caller gets its result
    /// back without waiting for any refetch triggered by the invalidation.
    pub async fn mutate<T, F, Fut>(
        &self,
        mutation: F,
        invalidates: &[KeyPattern],
    ) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let result = mutation().await?;

        for pattern in invalidates {
            self.bus.publish(pattern.clone());
        }
        debug!(patterns = invalidates.len(), "Mutation committed");

        Ok(result)
    }

    /// Publishes an invalidation pattern on the bus.
    pub fn invalidate(&self, pattern: KeyPattern) {
        self.bus.publish(pattern);
    }

    /// Applies an invalidation synchronously, bypassing the bus.
    ///
    /// Matching entries are marked stale and refetched before this returns
    /// control; useful in tests and teardown paths.
    pub fn invalidate_now(&self, pattern: &KeyPattern) -> InvalidationResult {
        let result = self.store.invalidate(pattern);
        self.coordinator.refetch_matching(pattern);
        result
    }

    /// Inserts a value directly into the cache as `success`.
    pub fn prime(&self, key: &RequestKey, value: V) {
        self.store.prime(key, value);
    }

    /// Returns the cache store.
    pub fn store(&self) -> &Arc<CacheStore<V>> {
        &self.store
    }

    /// Returns the subscription registry.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry<V>> {
        &self.registry
    }

    /// Returns the fetch coordinator.
    pub fn coordinator(&self) -> &Arc<FetchCoordinator<V>> {
        &self.coordinator
    }

    /// Tears the client down: stops the invalidation dispatcher, aborts
    /// in-flight fetches, and drops all subscriptions and cache entries.
    pub fn dispose(&self) {
        info!("Sync client disposed");
        self.bus.stop();
        self.coordinator.abort_all();
        self.registry.clear();
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resync_core::{FetchStatus, fetch_fn};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn counting_fetcher(counter: Arc<AtomicU32>) -> Arc<dyn Fetcher<String>> {
        Arc::new(fetch_fn("counting", move |key: RequestKey| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("v{} for {}", n, key))
            }
        }))
    }

    #[tokio::test]
    async fn test_mutate_publishes_invalidations() {
        let client: SyncClient<String> = SyncClient::new(ClientConfig::default());
        let key = RequestKey::new("users");
        let counter = Arc::new(AtomicU32::new(0));

        let resource = client.resource(key.clone(), counting_fetcher(Arc::clone(&counter)), None);
        resource.fetch().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        client
            .mutate(
                || async { Ok::<_, FetchError>(()) },
                &[KeyPattern::operation("users")],
            )
            .await
            .unwrap();

        // The bus refetches asynchronously
        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_mutation_does_not_invalidate() {
        let client: SyncClient<String> = SyncClient::new(ClientConfig::default());
        let key = RequestKey::new("users");
        let counter = Arc::new(AtomicU32::new(0));

        let resource = client.resource(key.clone(), counting_fetcher(Arc::clone(&counter)), None);
        resource.fetch().await.unwrap();

        let result: Result<(), _> = client
            .mutate(
                || async { Err(FetchError::network("write failed")) },
                &[KeyPattern::operation("users")],
            )
            .await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!client.store().peek(&key).unwrap().is_stale());
    }

    #[tokio::test]
    async fn test_invalidate_now_is_synchronous() {
        let client: SyncClient<String> = SyncClient::new(ClientConfig::default());
        let key = RequestKey::new("users");

        client.prime(&key, "v1".to_string());
        let result = client.invalidate_now(&KeyPattern::exact(key.clone()));

        assert_eq!(result.count, 1);
        assert!(client.store().peek(&key).unwrap().is_stale());
    }

    #[tokio::test]
    async fn test_dispose_clears_everything() {
        let client: SyncClient<String> = SyncClient::new(ClientConfig::default());
        let counter = Arc::new(AtomicU32::new(0));

        let resource = client.resource(
            RequestKey::new("users"),
            counting_fetcher(Arc::clone(&counter)),
            None,
        );
        resource.fetch().await.unwrap();
        let _sub = resource.subscribe(Arc::new(|_| {}));

        client.dispose();

        assert_eq!(client.store().entry_count(), 0);
        assert_eq!(client.coordinator().in_flight_count(), 0);
        assert!(!client.registry().has_subscribers(&RequestKey::new("users")));
    }

    #[tokio::test]
    async fn test_prime_makes_data_available() {
        let client: SyncClient<String> = SyncClient::new(ClientConfig::default());
        let key = RequestKey::new("users");

        client.prime(&key, "primed".to_string());

        let entry = client.store().peek(&key).unwrap();
        assert_eq!(entry.status(), FetchStatus::Success);
        assert_eq!(entry.data().unwrap().as_str(), "primed");
    }
}
