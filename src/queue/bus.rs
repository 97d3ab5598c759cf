use super::hub::WorkerMessage;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// In-process "queue changed" signal.
///
/// Holds no queue state. A listener that subscribes late misses earlier
/// signals, so consumers read the store on mount and treat the bus only as
/// a hint to re-read.
#[derive(Default)]
pub struct QueueChangeBus {
    listeners: Arc<DashMap<u64, Listener>>,
    next_id: AtomicU64,
}

impl QueueChangeBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notify(&self) {
        // Snapshot first so a listener may unsubscribe while being called.
        let listeners: Vec<Listener> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in listeners {
            listener();
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, Arc::new(listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Forward worker "queue updated" messages into this bus until the hub closes.
    pub fn bridge(self: &Arc<Self>, mut rx: broadcast::Receiver<WorkerMessage>) -> JoinHandle<()> {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(WorkerMessage::QueueUpdated) => bus.notify(),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("[QUEUE] bus bridge lagged by {} messages", skipped);
                        bus.notify();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Registration handle; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<DashMap<u64, Listener>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(&self.id);
        }
    }
}
