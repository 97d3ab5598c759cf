use crate::sync::SyncEvent;
use offsync::{
    ClientHub, OffsyncConfig, OffsyncError, QueueStore, QueuedRequest, Result, SessionStore,
    WorkerMessage, QUEUE_SYNC_TAG,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Which Authorization header a replayed request carries.
pub enum ReplayAuth {
    /// Headers exactly as captured at enqueue time.
    Captured,
    /// Re-stamp from a live session shared with this process.
    Session(Arc<SessionStore>),
    /// Re-stamp from the session persisted under this data dir, re-read every pass.
    Persisted(PathBuf),
}

impl ReplayAuth {
    fn current(&self) -> Option<String> {
        match self {
            ReplayAuth::Captured => None,
            ReplayAuth::Session(session) => session.authorization(),
            ReplayAuth::Persisted(dir) => SessionStore::load_or_default(dir).authorization(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Ids in the order they were resent.
    pub attempted: Vec<String>,
    pub delivered: Vec<String>,
    pub failed: Vec<OffsyncError>,
    /// Records in the store once the pass finished.
    pub remaining: usize,
    /// Pages that received the "queue updated" message.
    pub notified_clients: usize,
}

/// Drains the queue oldest-first when a sync event arrives.
pub struct SyncReplayer {
    store: QueueStore,
    http: reqwest::Client,
    clients: ClientHub,
    auth: ReplayAuth,
}

impl SyncReplayer {
    pub fn new(config: &OffsyncConfig, store: QueueStore, clients: ClientHub) -> Self {
        Self {
            store,
            http: config.http_client(),
            clients,
            auth: ReplayAuth::Persisted(config.data_dir.clone()),
        }
    }

    pub fn with_auth(mut self, auth: ReplayAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Events for other tags are ignored.
    pub async fn handle_sync(&self, event: &SyncEvent) -> Result<Option<ReplayReport>> {
        if event.tag != QUEUE_SYNC_TAG {
            tracing::debug!("[SYNC] ignoring sync tag {}", event.tag);
            return Ok(None);
        }
        self.replay_pass().await.map(Some)
    }

    /// One pass over every queued record.
    ///
    /// Failures are per record and never stop the pass; the failed record
    /// stays for the next one. Clients are notified once at the end.
    pub async fn replay_pass(&self) -> Result<ReplayReport> {
        let mut records = self.store.get_all()?;
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let authorization = self.auth.current();
        let mut report = ReplayReport::default();
        tracing::info!("[SYNC] replaying {} queued requests", records.len());

        for record in &records {
            report.attempted.push(record.id.clone());
            let outcome = match self.resend(record, authorization.as_deref()).await {
                Ok(()) => self.store.delete(&record.id).map_err(|e| replay_failure(record, e)),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => report.delivered.push(record.id.clone()),
                Err(e) => {
                    tracing::warn!("[SYNC] {}", e);
                    report.failed.push(e);
                }
            }
        }

        report.remaining = match self.store.len() {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("[SYNC] could not count remaining records: {}", e);
                report.failed.len()
            }
        };
        report.notified_clients = self.clients.post_all(WorkerMessage::QueueUpdated);

        tracing::info!(
            "[SYNC] pass done: delivered={}, failed={}, remaining={}",
            report.delivered.len(),
            report.failed.len(),
            report.remaining
        );
        Ok(report)
    }

    async fn resend(&self, record: &QueuedRequest, authorization: Option<&str>) -> Result<()> {
        let mut builder = self.http.request(record.method.to_http(), &record.url);
        for (name, value) in &record.headers {
            if authorization.is_some() && name.eq_ignore_ascii_case("authorization") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(authorization) = authorization {
            builder = builder.header("authorization", authorization);
        }
        if let Some(body) = record.wire_body().map_err(|e| replay_failure(record, e))? {
            if !record
                .headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case("content-type"))
            {
                builder = builder.header("content-type", "application/json");
            }
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| replay_failure(record, e))?;
        let status = response.status().as_u16();

        if is_retryable_status(status) {
            return Err(replay_failure(record, format!("server answered {}", status)));
        }
        if status >= 400 {
            tracing::warn!(
                "[SYNC] {} {} rejected with {}, dropping",
                record.method,
                record.url,
                status
            );
        }
        Ok(())
    }
}

/// Statuses that mean "try again later" rather than "delivered".
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 401 | 408 | 429) || status >= 500
}

fn replay_failure(record: &QueuedRequest, reason: impl std::fmt::Display) -> OffsyncError {
    OffsyncError::ReplayFailure {
        id: record.id.clone(),
        reason: reason.to_string(),
    }
}
