//! # resync core
//!
//! Domain types and traits for the resync data-synchronization layer.
//!
//! This crate defines the vocabulary shared between the engine and its
//! consumers:
//!
//! - [`RequestKey`] - canonical identity for one logical fetch operation
//! - [`KeyPattern`] - exact, operation-wide, or glob invalidation patterns
//! - [`CacheEntry`] / [`FetchStatus`] - per-key result and lifecycle state
//! - [`FetchError`] - error taxonomy driving retry behavior
//! - [`QueryOptions`] - staleness and retry policy
//! - [`Fetcher`] - the injected transport seam
//!
//! The engine itself (cache store, fetch coordinator, subscriptions,
//! invalidation bus) lives in the `resync-client` crate.

pub mod entry;
pub mod error;
pub mod fetcher;
pub mod key;
pub mod options;
pub mod pattern;

// Re-exports
pub use entry::{CacheEntry, FetchStatus};
pub use error::FetchError;
pub use fetcher::{FnFetcher, Fetcher, fetch_fn};
pub use key::RequestKey;
pub use options::QueryOptions;
pub use pattern::KeyPattern;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
