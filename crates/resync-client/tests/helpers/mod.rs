//! Test helpers para resync-client.

#![allow(dead_code, unused_imports)]

pub mod fetchers;

pub use fetchers::{CountingFetcher, FailingFetcher, FlakyFetcher};

use std::time::Duration;

/// Polls a condition until it holds, failing the test after ~500ms.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
