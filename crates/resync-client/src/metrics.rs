//! Cache and fetch metrics recording.

use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Registra las metricas del sync layer.
/// Llamar una vez al inicio para registrar las metricas.
pub fn register_metrics() {
    // Describir metricas
    metrics::describe_counter!("resync_cache_hits_total", "Total number of cache hits");
    metrics::describe_counter!("resync_cache_misses_total", "Total number of cache misses");
    metrics::describe_counter!(
        "resync_cache_stale_hits_total",
        "Cache hits served with stale data while a refetch runs"
    );
    metrics::describe_counter!(
        "resync_cache_evictions_total",
        "Total number of cache evictions"
    );
    metrics::describe_counter!(
        "resync_invalidations_total",
        "Total number of invalidation events applied"
    );
    metrics::describe_counter!(
        "resync_fetch_attempts_total",
        "Underlying fetch attempts, including retries"
    );
    metrics::describe_counter!("resync_fetch_retries_total", "Fetch attempts that were retries");
    metrics::describe_counter!(
        "resync_fetch_deduplicated_total",
        "Requests that joined an already in-flight fetch"
    );
    metrics::describe_counter!(
        "resync_fetch_cancellations_total",
        "In-flight fetches aborted after all waiters cancelled"
    );
    metrics::describe_gauge!("resync_cache_entries", "Current number of entries in cache");
    metrics::describe_histogram!("resync_fetch_seconds", "Time spent resolving fetches");
}

/// Recorder de metricas del sync layer.
/// Usa atomic counters internos para maximo rendimiento.
#[derive(Debug, Clone)]
pub struct SyncMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    fetches: Arc<AtomicU64>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            fetches: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registra un cache hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!("resync_cache_hits_total").increment(1);
    }

    /// Registra un cache hit servido con data stale
    pub fn record_stale_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!("resync_cache_stale_hits_total").increment(1);
    }

    /// Registra un cache miss
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("resync_cache_misses_total").increment(1);
    }

    /// Registra una eviction
    pub fn record_eviction(&self, reason: &str) {
        counter!("resync_cache_evictions_total", "reason" => reason.to_string()).increment(1);
    }

    /// Registra una invalidacion aplicada
    pub fn record_invalidation(&self, count: usize) {
        counter!("resync_invalidations_total").increment(count as u64);
    }

    /// Registra un fetch attempt (incluye retries)
    pub fn record_fetch_attempt(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        counter!("resync_fetch_attempts_total").increment(1);
    }

    /// Registra un retry
    pub fn record_retry(&self) {
        counter!("resync_fetch_retries_total").increment(1);
    }

    /// Registra un request deduplicado (se unio a un fetch en vuelo)
    pub fn record_deduplicated(&self) {
        counter!("resync_fetch_deduplicated_total").increment(1);
    }

    /// Registra un fetch abortado por cancelacion
    pub fn record_cancellation(&self) {
        counter!("resync_fetch_cancellations_total").increment(1);
    }

    /// Actualiza el gauge de entries
    pub fn update_entry_count(&self, count: usize) {
        gauge!("resync_cache_entries").set(count as f64);
    }

    /// Registra la duracion de un fetch resuelto
    pub fn record_fetch_duration(&self, outcome: &str, duration: Duration) {
        histogram!(
            "resync_fetch_seconds",
            "outcome" => outcome.to_string()
        )
        .record(duration.as_secs_f64());
    }

    /// Calcula hit rate (para logging/debugging)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 { 0.0 } else { hits / total }
    }

    /// Retorna el numero de hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Retorna el numero de misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Retorna el numero de fetch attempts
    pub fn fetch_attempts(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let metrics = SyncMetrics::new();

        // 3 hits, 1 miss = 75% hit rate
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();

        let rate = metrics.hit_rate();
        assert!((rate - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_hit_miss_counters() {
        let metrics = SyncMetrics::new();

        assert_eq!(metrics.hits(), 0);
        assert_eq!(metrics.misses(), 0);

        metrics.record_hit();
        metrics.record_stale_hit();
        metrics.record_miss();

        assert_eq!(metrics.hits(), 2);
        assert_eq!(metrics.misses(), 1);
    }

    #[test]
    fn test_fetch_attempt_counter() {
        let metrics = SyncMetrics::new();

        metrics.record_fetch_attempt();
        metrics.record_fetch_attempt();

        assert_eq!(metrics.fetch_attempts(), 2);
    }
}
