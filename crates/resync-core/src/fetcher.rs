//! Transport seam trait definition.

use std::future::Future;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::key::RequestKey;

/// A source of data for the synchronization layer.
///
/// This trait abstracts over the transport (HTTP client, database, mock)
/// so the coordinator can issue fetches without owning any wire protocol.
/// Implementations must be cheap to share; the coordinator holds them behind
/// `Arc` and may call `fetch` several times for the same key over the
/// entry's lifetime.
///
/// # Example
///
/// ```ignore
/// use resync_core::{Fetcher, FetchError, RequestKey};
///
/// struct UserApi {
///     client: reqwest::Client,
/// }
///
/// #[async_trait]
/// impl Fetcher<User> for UserApi {
///     async fn fetch(&self, key: &RequestKey) -> Result<User, FetchError> {
///         // issue the network call here
///     }
///
///     fn name(&self) -> &str {
///         "user-api"
///     }
/// }
/// ```
#[async_trait]
pub trait Fetcher<V>: Send + Sync {
    /// Fetches the value identified by the given key.
    ///
    /// # Errors
    ///
    /// - `FetchError::Network` / `FetchError::Timeout` for transport
    ///   failures; these are retried by the coordinator
    /// - `FetchError::Validation` for malformed responses; surfaced
    ///   immediately without retry
    async fn fetch(&self, key: &RequestKey) -> Result<V, FetchError>;

    /// Returns the name of this fetcher, used for logging.
    fn name(&self) -> &str {
        "fetcher"
    }
}

/// Adapts an async closure into a [`Fetcher`].
pub struct FnFetcher<F> {
    name: String,
    f: F,
}

/// Wraps an async closure as a [`Fetcher`].
///
/// The closure receives the request key by value, so it can be moved into
/// the returned future.
///
/// # Examples
///
/// ```
/// use resync_core::{fetch_fn, FetchError, Fetcher, RequestKey};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let fetcher = fetch_fn("echo", |key: RequestKey| async move {
///     Ok::<_, FetchError>(key.operation().to_string())
/// });
///
/// let value = fetcher.fetch(&RequestKey::new("users")).await.unwrap();
/// assert_eq!(value, "users");
/// # }
/// ```
pub fn fetch_fn<V, F, Fut>(name: impl Into<String>, f: F) -> FnFetcher<F>
where
    F: Fn(RequestKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<V, FetchError>> + Send,
    V: Send + 'static,
{
    FnFetcher {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<V, F, Fut> Fetcher<V> for FnFetcher<F>
where
    F: Fn(RequestKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<V, FetchError>> + Send,
    V: Send + 'static,
{
    async fn fetch(&self, key: &RequestKey) -> Result<V, FetchError> {
        (self.f)(key.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
