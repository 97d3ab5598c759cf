//! Connectivity signal for the page and reconnect triggers for the worker.
//!
//! The replay trigger is driven from outside the application: a
//! [`ReconnectTrigger`] resolves at least once per genuine reconnect and may
//! resolve spuriously, so whatever runs after it must be idempotent.

use crate::config::OffsyncConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Whether the host currently believes it is online.
pub trait ConnectivitySignal: Send + Sync {
    fn is_online(&self) -> bool;
}

#[async_trait]
pub trait ReconnectTrigger: Send + Sync {
    async fn wait_for_opportunity(&self);
}

/// Shared online/offline flag, observable through a watch channel.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Record the latest observation; returns true on an offline -> online edge.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.tx.send_replace(online);
        if was_online != online {
            tracing::info!("[NET] now {}", if online { "online" } else { "offline" });
        }
        !was_online && online
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl ConnectivitySignal for NetworkStatus {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Trigger fired explicitly by the embedder.
#[derive(Debug, Clone, Default)]
pub struct ManualTrigger {
    notify: Arc<Notify>,
}

impl ManualTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fire with no waiter is kept until the next wait.
    pub fn fire(&self) {
        self.notify.notify_one();
    }
}

#[async_trait]
impl ReconnectTrigger for ManualTrigger {
    async fn wait_for_opportunity(&self) {
        self.notify.notified().await;
    }
}

/// Polls the API health endpoint and turns offline -> online edges into
/// reconnect opportunities.
pub struct HealthProbe {
    http: reqwest::Client,
    url: String,
    interval: Duration,
    status: NetworkStatus,
    notify: Notify,
}

impl HealthProbe {
    pub fn new(config: &OffsyncConfig, status: NetworkStatus) -> Arc<Self> {
        Arc::new(Self {
            http: config.http_client(),
            url: config.endpoint(&config.health_path),
            interval: config.probe_interval(),
            status,
            notify: Notify::new(),
        })
    }

    pub fn status(&self) -> &NetworkStatus {
        &self.status
    }

    /// Any HTTP response means the network is reachable, whatever its status.
    pub async fn probe_once(&self) -> bool {
        match self.http.get(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("[NET] probe {} failed: {}", self.url, e);
                false
            }
        }
    }

    /// Probe forever. Fires once at start if online, then on every reconnect.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.interval);
        let mut first = true;

        loop {
            interval.tick().await;
            let online = self.probe_once().await;
            let reconnected = self.status.set_online(online);
            if online && (reconnected || first) {
                tracing::info!("[NET] reconnect opportunity");
                self.notify.notify_one();
            }
            first = false;
        }
    }
}

#[async_trait]
impl ReconnectTrigger for HealthProbe {
    async fn wait_for_opportunity(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_status_edges() {
        let status = NetworkStatus::new(false);
        assert!(!status.is_online());
        assert!(status.set_online(true));
        assert!(!status.set_online(true));
        assert!(!status.set_online(false));
        assert!(status.set_online(true));
    }

    #[tokio::test]
    async fn test_manual_trigger_keeps_early_fire() {
        let trigger = ManualTrigger::new();
        trigger.fire();
        tokio::time::timeout(Duration::from_secs(1), trigger.wait_for_opportunity())
            .await
            .expect("stored fire should resolve the wait");
    }

    #[tokio::test]
    async fn test_probe_marks_online_and_fires() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = OffsyncConfig::new(&server.uri(), "./unused").unwrap();
        let status = NetworkStatus::new(false);
        let probe = HealthProbe::new(&config, status.clone());

        let runner = tokio::spawn(Arc::clone(&probe).run());
        tokio::time::timeout(Duration::from_secs(2), probe.wait_for_opportunity())
            .await
            .expect("probe should fire after first successful check");
        assert!(status.is_online());
        runner.abort();
    }

    #[tokio::test]
    async fn test_probe_unreachable_is_offline() {
        // Nothing listens on port 9 locally.
        let config = OffsyncConfig::new("http://127.0.0.1:9", "./unused").unwrap();
        let status = NetworkStatus::new(true);
        let probe = HealthProbe::new(&config, status.clone());

        assert!(!probe.probe_once().await);
    }
}
