use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages the worker context posts to every open page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "QUEUE_UPDATED")]
    QueueUpdated,
}

/// Worker-to-page broadcast channel. Pages connect, the worker posts.
#[derive(Debug, Clone)]
pub struct ClientHub {
    tx: broadcast::Sender<WorkerMessage>,
}

impl ClientHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn connect(&self) -> broadcast::Receiver<WorkerMessage> {
        self.tx.subscribe()
    }

    /// Deliver to every connected page; returns how many received it.
    pub fn post_all(&self, message: WorkerMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new()
    }
}
