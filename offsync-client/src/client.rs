use crate::refresh::TokenRefresher;
use chrono::Utc;
use offsync::config::join_url;
use offsync::{
    ApiResponse, ConnectivitySignal, OffsyncConfig, OffsyncError, QueueChangeBus, QueueMethod,
    QueueReceipt, QueueStore, QueuedRequest, Result, SendOutcome, SessionStore, SyncRegistrar,
    QUEUE_SYNC_TAG,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) const AUTHORIZATION: &str = "authorization";
pub(crate) const CACHE_CONTROL: &str = "cache-control";
pub(crate) const NO_STORE: &str = "no-store";

/// One outgoing call. Header names are kept lowercase.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: http::Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub headers: BTreeMap<String, String>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: http::Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: BTreeMap::new(),
            retried: false,
        }
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set once the call has been resent after a token refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

enum Attempt {
    Done(SendOutcome),
    Unauthorized(ApiResponse),
}

/// Network interceptor for the page context.
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    session: Arc<SessionStore>,
    store: QueueStore,
    bus: Arc<QueueChangeBus>,
    connectivity: Arc<dyn ConnectivitySignal>,
    sync: Option<Arc<dyn SyncRegistrar>>,
    refresher: TokenRefresher,
    login_url: String,
}

impl ApiClient {
    pub fn new(
        config: &OffsyncConfig,
        session: Arc<SessionStore>,
        store: QueueStore,
        bus: Arc<QueueChangeBus>,
        connectivity: Arc<dyn ConnectivitySignal>,
    ) -> Self {
        let http = config.http_client();
        Self {
            base_url: config.api_base_url.clone(),
            refresher: TokenRefresher::new(http.clone(), config.endpoint(&config.refresh_path)),
            login_url: config.endpoint(&config.login_path),
            http,
            session,
            store,
            bus,
            connectivity,
            sync: None,
        }
    }

    /// Ask this registrar for a replay opportunity after each enqueue.
    pub fn with_sync_registrar(mut self, registrar: Arc<dyn SyncRegistrar>) -> Self {
        self.sync = Some(registrar);
        self
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub async fn get(&self, path: &str) -> Result<SendOutcome> {
        self.send(ApiRequest::new(http::Method::GET, path)).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<SendOutcome> {
        self.send(ApiRequest::new(http::Method::POST, path).json(body))
            .await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> Result<SendOutcome> {
        self.send(ApiRequest::new(http::Method::PUT, path).json(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<SendOutcome> {
        self.send(ApiRequest::new(http::Method::DELETE, path)).await
    }

    /// GET and decode the body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        match self.get(path).await? {
            SendOutcome::Sent(resp) => Ok(serde_json::from_value(resp.body)?),
            SendOutcome::Queued(receipt) => Err(OffsyncError::InvalidRequest(format!(
                "GET {} was queued",
                receipt.url
            ))),
        }
    }

    /// Send through the interceptor: stamp, dispatch, queue when offline,
    /// refresh and resend once on 401.
    pub async fn send(&self, mut request: ApiRequest) -> Result<SendOutcome> {
        loop {
            self.stamp(&mut request);
            match self.attempt(&request).await? {
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Unauthorized(resp) => {
                    let original = status_error(&resp);
                    if request.retried {
                        return Err(original);
                    }
                    tracing::debug!(
                        "[AUTH] {} on {} {}",
                        OffsyncError::AuthExpired,
                        request.method,
                        request.path
                    );
                    let authorization = self.refresher.refresh(&self.session, original).await?;
                    request.headers.insert(AUTHORIZATION.into(), authorization);
                    request.retried = true;
                    tracing::info!(
                        "[API] token refreshed, resending {} {}",
                        request.method,
                        request.path
                    );
                }
            }
        }
    }

    fn stamp(&self, request: &mut ApiRequest) {
        if let Some(authorization) = self.session.authorization() {
            request.headers.insert(AUTHORIZATION.into(), authorization);
        }
        request
            .headers
            .insert(CACHE_CONTROL.into(), NO_STORE.into());
    }

    async fn attempt(&self, request: &ApiRequest) -> Result<Attempt> {
        match self.dispatch(request).await {
            Ok(resp) if resp.is_success() => Ok(Attempt::Done(SendOutcome::Sent(resp))),
            Ok(resp) if resp.status == 401 => Ok(Attempt::Unauthorized(resp)),
            Ok(resp) => Err(status_error(&resp)),
            Err(e) if e.is_network_failure() && !self.connectivity.is_online() => {
                match QueueMethod::try_from(&request.method) {
                    Ok(method) => {
                        let receipt = self.enqueue(request, method)?;
                        Ok(Attempt::Done(SendOutcome::Queued(receipt)))
                    }
                    Err(_) => Err(OffsyncError::NetworkUnavailable(e.to_string())),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = join_url(&self.base_url, &request.path);
        let mut builder = self.http.request(request.method.clone(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| OffsyncError::Transport(format!("{} {}: {}", request.method, url, e)))?;
        read_response(response).await
    }

    fn enqueue(&self, request: &ApiRequest, method: QueueMethod) -> Result<QueueReceipt> {
        let record = QueuedRequest::new(
            join_url(&self.base_url, &request.path),
            method,
            request.body.clone(),
            request.headers.clone(),
        );

        if let Err(e) = self.store.add(&record) {
            tracing::error!(
                "[API] offline {} {} could not be queued: {}",
                method,
                request.path,
                e
            );
            return Err(e);
        }
        tracing::info!("[API] offline, queued {} {} as {}", method, request.path, record.id);

        self.bus.notify();
        if let Some(sync) = &self.sync {
            if let Err(e) = sync.register(QUEUE_SYNC_TAG) {
                tracing::debug!("[API] sync registration failed: {}", e);
            }
        }

        Ok(QueueReceipt {
            id: record.id,
            queued_at: Utc::now(),
            url: request.path.clone(),
        })
    }

    /// Raw call that bypasses queueing and refresh.
    pub(crate) async fn dispatch_direct(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut request = request;
        request
            .headers
            .insert(CACHE_CONTROL.into(), NO_STORE.into());
        let resp = self.dispatch(&request).await?;
        if resp.is_success() {
            Ok(resp)
        } else {
            Err(status_error(&resp))
        }
    }

    pub(crate) fn login_url(&self) -> &str {
        &self.login_url
    }
}

pub(crate) async fn read_response(response: reqwest::Response) -> Result<ApiResponse> {
    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| OffsyncError::Transport(e.to_string()))?;

    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()))
    };

    Ok(ApiResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body,
    })
}

pub(crate) fn status_error(resp: &ApiResponse) -> OffsyncError {
    OffsyncError::Status {
        status: resp.status,
        body: match &resp.body {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync::{LoginPayload, NetworkStatus, TokenType};
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        _tmp: TempDir,
        store: QueueStore,
        status: NetworkStatus,
        session: Arc<SessionStore>,
        client: ApiClient,
    }

    fn harness(base: &str, online: bool) -> Harness {
        let tmp = TempDir::new().unwrap();
        let config = OffsyncConfig::new(base, tmp.path()).unwrap();
        let store = QueueStore::open(tmp.path()).unwrap();
        let status = NetworkStatus::new(online);
        let session = Arc::new(SessionStore::in_memory());
        let client = ApiClient::new(
            &config,
            Arc::clone(&session),
            store.clone(),
            QueueChangeBus::new(),
            Arc::new(status.clone()),
        );
        Harness {
            _tmp: tmp,
            store,
            status,
            session,
            client,
        }
    }

    #[test]
    fn test_request_builder_lowercases_headers() {
        let req = ApiRequest::new(http::Method::POST, "/clientes")
            .header("X-Trace", "1")
            .json(json!({"a": 1}));
        assert_eq!(req.headers.get("x-trace").map(String::as_str), Some("1"));
        assert!(!req.is_retried());
    }

    #[tokio::test]
    async fn test_online_call_passes_through_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/clientes"))
            .and(header("authorization", "Bearer tok"))
            .and(header("cache-control", "no-store"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), true);
        h.session.login(LoginPayload {
            token_type: TokenType::Bearer,
            token: "tok".into(),
            refresh_token: None,
            expires_in: None,
            user: None,
        });

        let outcome = h
            .client
            .post("/clientes", json!({"razaoSocial": "Acme"}))
            .await
            .unwrap();
        match outcome {
            SendOutcome::Sent(resp) => {
                assert_eq!(resp.status, 201);
                assert_eq!(resp.body["id"], 1);
            }
            other => panic!("expected Sent, got {:?}", other),
        }
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_http_error_propagates_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid cnpj"))
            .mount(&server)
            .await;

        let h = harness(&server.uri(), true);
        let err = h.client.put("/clientes/1", json!({})).await.unwrap_err();
        match err {
            OffsyncError::Status { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "invalid cnpj");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_while_online_is_not_queued() {
        let h = harness("http://127.0.0.1:9", true);
        let err = h.client.delete("/clientes/1").await.unwrap_err();
        assert!(matches!(err, OffsyncError::Transport(_)));
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_offline_get_is_not_queued() {
        let h = harness("http://127.0.0.1:9", false);
        let err = h.client.get("/clientes").await.unwrap_err();
        assert!(matches!(err, OffsyncError::NetworkUnavailable(_)));
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_offline_delete_is_queued() {
        let h = harness("http://127.0.0.1:9", false);
        assert!(!h.status.is_online());

        let outcome = h.client.delete("/equipamentos/3").await.unwrap();
        assert!(outcome.is_queued());

        let all = h.store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].method, QueueMethod::Delete);
        assert_eq!(all[0].url, "http://127.0.0.1:9/equipamentos/3");
        assert!(all[0].body.is_none());
    }
}
