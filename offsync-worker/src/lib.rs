//! Worker context: intercepts mutating fetches that bypass the page and
//! replays the queue when the platform offers a sync opportunity.
//!
//! Nothing here shares memory with `offsync-client`; each worker opens its
//! own handle on the queue directory.

pub mod fetch;
pub mod replay;
pub mod sync;

pub use fetch::{BackgroundFetchInterceptor, FetchOutcome, InterceptedRequest, InterceptedResponse};
pub use replay::{ReplayAuth, ReplayReport, SyncReplayer};
pub use sync::{SyncEvent, SyncManager};

use offsync::{ClientHub, OffsyncConfig, QueueStore, ReconnectTrigger, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One worker instance wired from configuration.
pub struct Worker {
    pub sync: Arc<SyncManager>,
    pub fetch: BackgroundFetchInterceptor,
    pub replayer: Arc<SyncReplayer>,
}

impl Worker {
    pub fn new(config: &OffsyncConfig, clients: ClientHub) -> Result<Self> {
        let store = QueueStore::open(&config.data_dir)?;
        let sync = SyncManager::new();
        sync.register_if_pending(&store)?;

        let fetch = BackgroundFetchInterceptor::new(config, store.clone(), sync.clone());
        let replayer = Arc::new(SyncReplayer::new(config, store, clients));

        tracing::info!("[SYNC] worker started for {}", config.api_base_url);
        Ok(Self {
            sync,
            fetch,
            replayer,
        })
    }

    pub fn spawn_sync_loop(&self, trigger: Arc<dyn ReconnectTrigger>) -> JoinHandle<()> {
        let sync = Arc::clone(&self.sync);
        let replayer = Arc::clone(&self.replayer);
        tokio::spawn(async move { sync.run(trigger, replayer).await })
    }
}
