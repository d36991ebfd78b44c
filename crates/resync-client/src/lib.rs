//! # resync client
//!
//! Client-side data-synchronization engine: the layer that issues,
//! deduplicates, caches, and invalidates asynchronous data requests on
//! behalf of UI-level consumers.
//!
//! ## Components
//!
//! - [`CacheStore`] - in-memory map from request keys to cached results and
//!   lifecycle metadata, with pattern invalidation and optional LRU capacity
//! - [`FetchCoordinator`] - request deduplication, retry with exponential
//!   backoff, generation-guarded completions, reference-counted cancellation
//! - [`SubscriptionRegistry`] - per-key observer callbacks with
//!   snapshot-then-invoke notification
//! - [`InvalidationBus`] - fire-and-forget propagation of invalidation
//!   patterns from mutations to refetches
//! - [`SyncClient`] - the assembled layer with an explicit create/dispose
//!   lifecycle, and [`Resource`] as its consumer surface
//!
//! ## Example
//!
//! ```ignore
//! use resync_client::{ClientConfig, SyncClient};
//! use resync_core::{fetch_fn, KeyPattern, RequestKey};
//!
//! let client: SyncClient<User> = SyncClient::new(ClientConfig::default());
//!
//! let user = client.resource(
//!     RequestKey::with_params("user", &UserParams { id: 1 })?,
//!     Arc::new(fetch_fn("user-api", fetch_user)),
//!     None,
//! );
//!
//! // Stale-while-revalidate read; concurrent calls share one network fetch
//! let data = user.fetch().await?;
//! ```

pub mod client;
pub mod coordinator;
pub mod invalidation;
pub mod metrics;
pub mod resource;
pub mod store;
pub mod subscription;

// Re-exports
pub use client::{ClientConfig, SyncClient};
pub use coordinator::{FetchCoordinator, FetchHandle};
pub use invalidation::{InvalidateFn, InvalidationBus};
pub use metrics::{SyncMetrics, register_metrics};
pub use resource::{Resource, ResourceState};
pub use store::{CacheStore, InvalidationResult, StoreConfig};
pub use subscription::{SubscriberFn, SubscriptionHandle, SubscriptionRegistry};

// Re-export resync_core for consumers
pub use resync_core;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_defined() {
        assert!(!version().is_empty());
    }
}
