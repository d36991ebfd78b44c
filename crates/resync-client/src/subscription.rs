//! Observer registry for cache updates.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use resync_core::{CacheEntry, RequestKey};
use tracing::debug;

/// Callback invoked with the updated entry after a cache mutation.
pub type SubscriberFn<V> = Arc<dyn Fn(&CacheEntry<V>) + Send + Sync>;

/// Tracks which consumers observe which request keys.
///
/// Subscribing returns a [`SubscriptionHandle`]; dropping the handle
/// unsubscribes, after which the callback is never invoked again.
/// Notification is a synchronous fan-out over a snapshot of the current
/// registrations, in registration order: unsubscribing during a notification
/// pass does not affect callbacks already scheduled in that pass.
pub struct SubscriptionRegistry<V> {
    subscribers: RwLock<HashMap<RequestKey, Vec<(u64, SubscriberFn<V>)>>>,
    next_id: AtomicU64,
}

impl<V> SubscriptionRegistry<V> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers a callback for the given key.
    ///
    /// The callback runs synchronously on every cache mutation affecting the
    /// key until the returned handle is dropped.
    pub fn subscribe(
        self: &Arc<Self>,
        key: &RequestKey,
        callback: SubscriberFn<V>,
    ) -> SubscriptionHandle<V> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.write();
        subscribers
            .entry(key.clone())
            .or_default()
            .push((id, callback));

        debug!(key = %key, id = id, "Subscriber registered");

        SubscriptionHandle {
            registry: Arc::downgrade(self),
            key: key.clone(),
            id,
        }
    }

    /// Invokes all callbacks currently registered for the key.
    ///
    /// The registration list is snapshotted before the first invocation, so
    /// the lock is not held while callbacks run.
    pub fn notify(&self, key: &RequestKey, entry: &CacheEntry<V>) {
        let snapshot: Vec<SubscriberFn<V>> = {
            let subscribers = self.subscribers.read();
            match subscribers.get(key) {
                Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => return,
            }
        };

        for callback in snapshot {
            callback(entry);
        }
    }

    /// Returns true if any subscriber observes the given key.
    pub fn has_subscribers(&self, key: &RequestKey) -> bool {
        self.subscribers
            .read()
            .get(key)
            .is_some_and(|list| !list.is_empty())
    }

    /// Returns the number of subscribers for the given key.
    pub fn subscriber_count(&self, key: &RequestKey) -> usize {
        self.subscribers
            .read()
            .get(key)
            .map_or(0, |list| list.len())
    }

    /// Removes all subscribers.
    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    fn unsubscribe(&self, key: &RequestKey, id: u64) {
        let mut subscribers = self.subscribers.write();
        if let Some(list) = subscribers.get_mut(key) {
            list.retain(|(entry_id, _)| *entry_id != id);
            if list.is_empty() {
                subscribers.remove(key);
            }
        }
    }
}

impl<V> Default for SubscriptionRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for an active subscription. Dropping it unsubscribes.
pub struct SubscriptionHandle<V> {
    registry: Weak<SubscriptionRegistry<V>>,
    key: RequestKey,
    id: u64,
}

impl<V> SubscriptionHandle<V> {
    /// Returns the key this subscription observes.
    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    /// Explicitly removes the subscription.
    pub fn unsubscribe(self) {}
}

impl<V> Drop for SubscriptionHandle<V> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(&self.key, self.id);
            debug!(key = %self.key, id = self.id, "Subscriber removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use resync_core::FetchStatus;

    fn entry_with_data(value: &str) -> CacheEntry<String> {
        let mut entry = CacheEntry::new();
        let generation = entry.begin_fetch();
        entry.complete_success(generation, Arc::new(value.to_string()));
        entry
    }

    #[test]
    fn test_notify_invokes_subscribers_in_order() {
        let registry: Arc<SubscriptionRegistry<String>> = Arc::new(SubscriptionRegistry::new());
        let key = RequestKey::new("users");
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = Arc::clone(&order);
        let _sub_a = registry.subscribe(&key, Arc::new(move |_| order_a.lock().push("a")));

        let order_b = Arc::clone(&order);
        let _sub_b = registry.subscribe(&key, Arc::new(move |_| order_b.lock().push("b")));

        registry.notify(&key, &entry_with_data("v1"));

        assert_eq!(*order.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_dropped_handle_receives_no_notifications() {
        let registry: Arc<SubscriptionRegistry<String>> = Arc::new(SubscriptionRegistry::new());
        let key = RequestKey::new("users");
        let calls = Arc::new(Mutex::new(0u32));

        let calls_clone = Arc::clone(&calls);
        let handle = registry.subscribe(&key, Arc::new(move |_| *calls_clone.lock() += 1));

        registry.notify(&key, &entry_with_data("v1"));
        assert_eq!(*calls.lock(), 1);

        drop(handle);

        registry.notify(&key, &entry_with_data("v2"));
        assert_eq!(*calls.lock(), 1);
        assert!(!registry.has_subscribers(&key));
    }

    #[test]
    fn test_notify_passes_entry_state() {
        let registry: Arc<SubscriptionRegistry<String>> = Arc::new(SubscriptionRegistry::new());
        let key = RequestKey::new("users");
        let seen = Arc::new(Mutex::new(None));

        let seen_clone = Arc::clone(&seen);
        let _sub = registry.subscribe(
            &key,
            Arc::new(move |entry: &CacheEntry<String>| {
                *seen_clone.lock() = Some((entry.status(), entry.data()));
            }),
        );

        registry.notify(&key, &entry_with_data("v1"));

        let (status, data) = seen.lock().take().unwrap();
        assert_eq!(status, FetchStatus::Success);
        assert_eq!(data.unwrap().as_str(), "v1");
    }

    #[test]
    fn test_notify_other_key_is_ignored() {
        let registry: Arc<SubscriptionRegistry<String>> = Arc::new(SubscriptionRegistry::new());
        let calls = Arc::new(Mutex::new(0u32));

        let calls_clone = Arc::clone(&calls);
        let _sub = registry.subscribe(
            &RequestKey::new("users"),
            Arc::new(move |_| *calls_clone.lock() += 1),
        );

        registry.notify(&RequestKey::new("posts"), &entry_with_data("v1"));
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn test_unsubscribe_during_notification_pass() {
        // A subscriber that unsubscribes another mid-pass must not affect
        // callbacks already snapshotted for that pass.
        let registry: Arc<SubscriptionRegistry<String>> = Arc::new(SubscriptionRegistry::new());
        let key = RequestKey::new("users");
        let calls = Arc::new(Mutex::new(Vec::new()));

        let later_handle: Arc<Mutex<Option<SubscriptionHandle<String>>>> =
            Arc::new(Mutex::new(None));

        let calls_a = Arc::clone(&calls);
        let later_a = Arc::clone(&later_handle);
        let _sub_a = registry.subscribe(
            &key,
            Arc::new(move |_| {
                calls_a.lock().push("a");
                // Drop subscriber b while the pass is running
                later_a.lock().take();
            }),
        );

        let calls_b = Arc::clone(&calls);
        let sub_b = registry.subscribe(&key, Arc::new(move |_| calls_b.lock().push("b")));
        *later_handle.lock() = Some(sub_b);

        registry.notify(&key, &entry_with_data("v1"));

        // b still ran in this pass, but is gone for the next one
        assert_eq!(*calls.lock(), vec!["a", "b"]);

        registry.notify(&key, &entry_with_data("v2"));
        assert_eq!(*calls.lock(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_subscriber_count() {
        let registry: Arc<SubscriptionRegistry<String>> = Arc::new(SubscriptionRegistry::new());
        let key = RequestKey::new("users");

        assert_eq!(registry.subscriber_count(&key), 0);

        let _a = registry.subscribe(&key, Arc::new(|_| {}));
        let _b = registry.subscribe(&key, Arc::new(|_| {}));
        assert_eq!(registry.subscriber_count(&key), 2);
    }
}
