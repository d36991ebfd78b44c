//! In-memory cache store with pattern invalidation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use resync_core::{CacheEntry, FetchError, KeyPattern, RequestKey};
use tracing::{debug, info};

use crate::metrics::SyncMetrics;
use crate::subscription::SubscriptionRegistry;

/// Configuracion del cache store.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Maximo numero de entries; al superarlo se desaloja la entry menos
    /// usada recientemente. `None` (default) desactiva la eviction: las
    /// entries viven mientras viva el store.
    pub max_entries: Option<usize>,
}

/// Resultado de una operación de invalidación.
#[derive(Debug, Clone)]
pub struct InvalidationResult {
    /// Número de entries invalidadas.
    pub count: usize,
    /// Patrones aplicados.
    pub patterns: Vec<String>,
}

/// In-memory mapping from request keys to cached results and lifecycle
/// metadata.
///
/// Entries are mutated only through the lifecycle methods
/// ([`begin_fetch`](Self::begin_fetch),
/// [`complete_success`](Self::complete_success),
/// [`complete_error`](Self::complete_error),
/// [`cancel_fetch`](Self::cancel_fetch)), each guarded by the per-entry
/// generation so a superseded completion is discarded. Every mutation
/// notifies the subscription registry for the affected key after the store
/// lock has been released.
///
/// Invalidation marks matching entries stale without deleting their data; no
/// entry is ever dropped except under the configured capacity bound, and
/// entries with a fetch in flight are exempt even from that.
pub struct CacheStore<V> {
    inner: RwLock<HashMap<RequestKey, CacheEntry<V>>>,
    registry: Arc<SubscriptionRegistry<V>>,
    metrics: SyncMetrics,
    config: StoreConfig,
}

impl<V: Clone + Send + Sync + 'static> CacheStore<V> {
    /// Creates a new store with the given configuration.
    pub fn new(
        config: StoreConfig,
        registry: Arc<SubscriptionRegistry<V>>,
        metrics: SyncMetrics,
    ) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            registry,
            metrics,
            config,
        }
    }

    /// Obtiene una entry del cache si existe.
    ///
    /// Records hit/miss metrics and refreshes the entry's access time for
    /// eviction ordering.
    pub fn get(&self, key: &RequestKey) -> Option<CacheEntry<V>> {
        let result = {
            let mut inner = self.inner.write();
            inner.get_mut(key).map(|entry| {
                entry.touch();
                entry.clone()
            })
        };

        match &result {
            Some(entry) if entry.is_stale() => self.metrics.record_stale_hit(),
            Some(_) => self.metrics.record_hit(),
            None => self.metrics.record_miss(),
        }

        result
    }

    /// Returns the entry without touching access time or metrics.
    pub fn peek(&self, key: &RequestKey) -> Option<CacheEntry<V>> {
        self.inner.read().get(key).cloned()
    }

    /// Inserta un valor directamente como `success`, sin pasar por un fetch.
    pub fn prime(&self, key: &RequestKey, value: V) {
        let (snapshot, evicted) = {
            let mut inner = self.inner.write();
            let is_new = !inner.contains_key(key);
            let entry = inner.entry(key.clone()).or_default();
            let generation = entry.begin_fetch();
            entry.complete_success(generation, Arc::new(value));
            let snapshot = entry.clone();
            let evicted = if is_new { self.evict_if_over(&mut inner, key) } else { None };
            (snapshot, evicted)
        };

        self.update_entry_gauge();
        self.registry.notify(key, &snapshot);
        if let Some(evicted_key) = evicted {
            debug!(key = %evicted_key, "Cache entry evicted");
        }
    }

    /// Transitions the entry to `pending` for a new fetch and returns the
    /// fetch generation. Prior data is retained.
    pub fn begin_fetch(&self, key: &RequestKey) -> u64 {
        let (generation, snapshot) = self.begin_fetch_deferred(key);
        self.registry.notify(key, &snapshot);
        generation
    }

    /// Como `begin_fetch`, pero sin notificar a los subscribers.
    ///
    /// The caller must pass the returned snapshot to the registry once it no
    /// longer holds any lock of its own; subscriber callbacks may re-enter
    /// the caller.
    pub fn begin_fetch_deferred(&self, key: &RequestKey) -> (u64, CacheEntry<V>) {
        let (generation, snapshot, evicted) = {
            let mut inner = self.inner.write();
            let is_new = !inner.contains_key(key);
            let entry = inner.entry(key.clone()).or_default();
            let generation = entry.begin_fetch();
            let snapshot = entry.clone();
            let evicted = if is_new { self.evict_if_over(&mut inner, key) } else { None };
            (generation, snapshot, evicted)
        };

        self.update_entry_gauge();
        if let Some(evicted_key) = evicted {
            debug!(key = %evicted_key, "Cache entry evicted");
        }
        (generation, snapshot)
    }

    /// Stores a successful result for the fetch of the given generation.
    ///
    /// Returns false if the completion was superseded by a newer fetch.
    pub fn complete_success(&self, key: &RequestKey, generation: u64, value: Arc<V>) -> bool {
        let snapshot = {
            let mut inner = self.inner.write();
            inner.get_mut(key).and_then(|entry| {
                entry
                    .complete_success(generation, value)
                    .then(|| entry.clone())
            })
        };

        match snapshot {
            Some(snapshot) => {
                self.registry.notify(key, &snapshot);
                true
            },
            None => {
                debug!(key = %key, generation = generation, "Discarded superseded completion");
                false
            },
        }
    }

    /// Settles the fetch of the given generation with an error. Prior data
    /// stays readable alongside the error.
    pub fn complete_error(&self, key: &RequestKey, generation: u64, error: FetchError) -> bool {
        let snapshot = {
            let mut inner = self.inner.write();
            inner.get_mut(key).and_then(|entry| {
                entry
                    .complete_error(generation, error)
                    .then(|| entry.clone())
            })
        };

        match snapshot {
            Some(snapshot) => {
                self.registry.notify(key, &snapshot);
                true
            },
            None => {
                debug!(key = %key, generation = generation, "Discarded superseded error");
                false
            },
        }
    }

    /// Rolls back a cancelled fetch of the given generation.
    pub fn cancel_fetch(&self, key: &RequestKey, generation: u64) -> bool {
        let snapshot = {
            let mut inner = self.inner.write();
            inner
                .get_mut(key)
                .and_then(|entry| entry.cancel_fetch(generation).then(|| entry.clone()))
        };

        match snapshot {
            Some(snapshot) => {
                self.registry.notify(key, &snapshot);
                true
            },
            None => false,
        }
    }

    /// Marca como stale todas las entries que coincidan con el patrón, sin
    /// borrar su data.
    pub fn invalidate(&self, pattern: &KeyPattern) -> InvalidationResult {
        let snapshots: Vec<(RequestKey, CacheEntry<V>)> = {
            let mut inner = self.inner.write();
            inner
                .iter_mut()
                .filter(|(key, _)| pattern.matches(key))
                .map(|(key, entry)| {
                    entry.mark_stale();
                    (key.clone(), entry.clone())
                })
                .collect()
        };

        let count = snapshots.len();
        for (key, snapshot) in &snapshots {
            self.registry.notify(key, snapshot);
        }

        self.metrics.record_invalidation(count);
        info!(
            pattern = %pattern,
            count = count,
            "Cache entries invalidated"
        );

        InvalidationResult {
            count,
            patterns: vec![pattern.to_string()],
        }
    }

    /// Invalida múltiples patrones a la vez.
    pub fn invalidate_many(&self, patterns: &[KeyPattern]) -> InvalidationResult {
        let mut total_count = 0;
        let mut all_patterns = Vec::new();

        for pattern in patterns {
            let result = self.invalidate(pattern);
            total_count += result.count;
            all_patterns.extend(result.patterns);
        }

        InvalidationResult {
            count: total_count,
            patterns: all_patterns,
        }
    }

    /// Returns the cached keys matching the given pattern.
    pub fn keys_matching(&self, pattern: &KeyPattern) -> Vec<RequestKey> {
        self.inner
            .read()
            .keys()
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect()
    }

    /// Retorna el numero de entries en cache.
    pub fn entry_count(&self) -> usize {
        self.inner.read().len()
    }

    /// Removes every entry. Used on client teardown.
    pub fn clear(&self) {
        self.inner.write().clear();
        self.update_entry_gauge();
    }

    /// Retorna las metricas para acceso externo.
    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    /// Returns the subscription registry backing this store.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry<V>> {
        &self.registry
    }

    /// Evicts the least-recently-used settled entry when the capacity bound
    /// is exceeded. Entries with a fetch in flight are never evicted, and
    /// neither is the key that triggered the insert.
    fn evict_if_over(
        &self,
        inner: &mut HashMap<RequestKey, CacheEntry<V>>,
        just_inserted: &RequestKey,
    ) -> Option<RequestKey> {
        let max_entries = self.config.max_entries?;
        if inner.len() <= max_entries {
            return None;
        }

        let victim = inner
            .iter()
            .filter(|(key, entry)| {
                *key != just_inserted && entry.status() != resync_core::FetchStatus::Pending
            })
            .min_by_key(|(_, entry)| entry.last_accessed())
            .map(|(key, _)| key.clone())?;

        inner.remove(&victim);
        self.metrics.record_eviction("capacity");
        Some(victim)
    }

    fn update_entry_gauge(&self) {
        self.metrics.update_entry_count(self.inner.read().len());
    }
}
