use super::bus::{QueueChangeBus, Subscription};
use super::store::QueueStore;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// What the UI reads to show a pending badge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pending {
    pub pending: usize,
}

/// Pending count derived from the store, re-derived on every bus signal.
pub struct PendingTracker {
    store: QueueStore,
    tx: Arc<watch::Sender<Pending>>,
    _subscription: Subscription,
}

impl PendingTracker {
    /// Read the store once, then follow the bus.
    pub fn mount(store: QueueStore, bus: &QueueChangeBus) -> Result<Self> {
        let initial = Pending {
            pending: store.len()?,
        };
        let (tx, _) = watch::channel(initial);
        let tx = Arc::new(tx);

        let listener_store = store.clone();
        let listener_tx = Arc::clone(&tx);
        let subscription = bus.subscribe(move || {
            refresh_into(&listener_store, &listener_tx);
        });

        Ok(Self {
            store,
            tx,
            _subscription: subscription,
        })
    }

    pub fn pending(&self) -> Pending {
        *self.tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<Pending> {
        self.tx.subscribe()
    }

    pub fn refresh(&self) {
        refresh_into(&self.store, &self.tx);
    }
}

fn refresh_into(store: &QueueStore, tx: &watch::Sender<Pending>) {
    match store.len() {
        Ok(pending) => {
            tx.send_replace(Pending { pending });
        }
        Err(e) => tracing::warn!("[QUEUE] pending count refresh failed: {}", e),
    }
}
