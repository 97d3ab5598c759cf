use crate::replay::SyncReplayer;
use offsync::{QueueStore, ReconnectTrigger, Result, SyncRegistrar, QUEUE_SYNC_TAG};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

/// A replay opportunity delivered for one registered tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub tag: String,
}

/// Tracks background-sync registrations and delivers sync events when a
/// reconnect opportunity arrives.
///
/// A registration is consumed by the event it produces. If the pass leaves
/// records behind, the tag is registered again so the next opportunity
/// retries them; there is no other backoff.
#[derive(Debug, Default)]
pub struct SyncManager {
    tags: Mutex<BTreeSet<String>>,
}

impl SyncManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(tag)
    }

    /// Records left by an earlier run still need a replay.
    pub fn register_if_pending(&self, store: &QueueStore) -> Result<()> {
        if !store.is_empty()? {
            self.register(QUEUE_SYNC_TAG)?;
        }
        Ok(())
    }

    pub fn take_events(&self) -> Vec<SyncEvent> {
        let mut tags = self.tags.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *tags)
            .into_iter()
            .map(|tag| SyncEvent { tag })
            .collect()
    }

    /// Deliver one event per registered tag. Returns the number delivered.
    pub async fn fire(&self, replayer: &SyncReplayer) -> usize {
        let events = self.take_events();
        for event in &events {
            match replayer.handle_sync(event).await {
                Ok(Some(report)) if report.remaining > 0 => {
                    tracing::info!(
                        "[SYNC] {} records left after pass, re-registering {}",
                        report.remaining,
                        event.tag
                    );
                    let _ = self.register(&event.tag);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("[SYNC] sync event {} failed: {}", event.tag, e);
                    let _ = self.register(&event.tag);
                }
            }
        }
        events.len()
    }

    /// Wait for reconnect opportunities forever, firing on each.
    pub async fn run(&self, trigger: Arc<dyn ReconnectTrigger>, replayer: Arc<SyncReplayer>) {
        loop {
            trigger.wait_for_opportunity().await;
            let fired = self.fire(&replayer).await;
            tracing::debug!("[SYNC] opportunity handled, {} events", fired);
        }
    }
}

impl SyncRegistrar for SyncManager {
    fn register(&self, tag: &str) -> Result<()> {
        let inserted = self
            .tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag.to_string());
        if inserted {
            tracing::debug!("[SYNC] registered {}", tag);
        }
        Ok(())
    }
}
