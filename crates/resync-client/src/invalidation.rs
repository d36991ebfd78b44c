//! Invalidation event bus.

use std::sync::Arc;

use parking_lot::RwLock;
use resync_core::KeyPattern;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Handler invoked for every published invalidation pattern.
pub type InvalidateFn = Arc<dyn Fn(&KeyPattern) + Send + Sync>;

/// Fire-and-forget bus propagating invalidation events from mutations to the
/// cache layer.
///
/// `publish` never blocks: patterns are queued on an unbounded channel and a
/// spawned dispatcher task invokes the registered handlers, so the mutation's
/// own caller is never blocked on refetch work. The dispatcher stops when
/// [`stop`](Self::stop) is called or the bus is dropped.
pub struct InvalidationBus {
    tx: mpsc::UnboundedSender<KeyPattern>,
    handlers: Arc<RwLock<Vec<InvalidateFn>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl InvalidationBus {
    /// Creates the bus and spawns its dispatcher task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handlers: Arc<RwLock<Vec<InvalidateFn>>> = Arc::new(RwLock::new(Vec::new()));

        tokio::spawn(Self::dispatch(rx, Arc::clone(&handlers), shutdown_rx));

        Self {
            tx,
            handlers,
            shutdown_tx,
        }
    }

    /// Publishes an invalidation pattern. Fire-and-forget.
    pub fn publish(&self, pattern: KeyPattern) {
        debug!(pattern = %pattern, "Invalidation published");
        if self.tx.send(pattern).is_err() {
            debug!("Invalidation bus already stopped, event dropped");
        }
    }

    /// Registers a handler invoked for every published pattern.
    pub fn on_invalidate(&self, handler: InvalidateFn) {
        self.handlers.write().push(handler);
    }

    /// Signals the dispatcher to stop. Queued events are dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Runs the dispatcher loop.
    async fn dispatch(
        mut rx: mpsc::UnboundedReceiver<KeyPattern>,
        handlers: Arc<RwLock<Vec<InvalidateFn>>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(pattern) => {
                            let snapshot: Vec<InvalidateFn> =
                                handlers.read().iter().map(Arc::clone).collect();
                            for handler in snapshot {
                                handler(&pattern);
                            }
                        },
                        None => break,
                    }
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Invalidation bus shutting down");
                        break;
                    }
                }
            }
        }
    }
}

impl Drop for InvalidationBus {
    fn drop(&mut self) {
        self.stop();
    }
}
