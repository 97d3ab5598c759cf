use chrono::Utc;
use offsync::{
    MonotonicClock, OffsyncConfig, OffsyncError, QueueMethod, QueueReceipt, QueueStore,
    QueuedRequest, Result, SyncRegistrar, QUEUED_STATUS, QUEUE_SYNC_TAG,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// A request seen at the worker's network boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl InterceptedRequest {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Lowercased names; repeated headers joined with ", ".
    pub fn flattened_headers(&self) -> BTreeMap<String, String> {
        let mut flat: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in &self.headers {
            flat.entry(name.to_ascii_lowercase())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.clone());
        }
        flat
    }

    /// JSON body if it parses, otherwise `None`.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        match serde_json::from_slice::<serde_json::Value>(&self.body) {
            Ok(serde_json::Value::Null) | Err(_) => None,
            Ok(value) => Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl InterceptedResponse {
    /// The immediate answer given when a request was queued.
    pub fn queued() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status: QUEUED_STATUS,
            headers,
            body: br#"{"queued":true}"#.to_vec(),
        }
    }

    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Not ours (not POST/PUT/DELETE, or a foreign origin); the caller fetches it normally.
    Bypassed(InterceptedRequest),
    /// The network answered; passed through untouched, whatever the status.
    Network(InterceptedResponse),
    Queued {
        receipt: QueueReceipt,
        response: InterceptedResponse,
    },
}

/// Worker-side interceptor for mutating calls to the API origin.
pub struct BackgroundFetchInterceptor {
    api_origin: url::Origin,
    http: reqwest::Client,
    store: QueueStore,
    registrar: Arc<dyn SyncRegistrar>,
    clock: MonotonicClock,
}

impl BackgroundFetchInterceptor {
    pub fn new(
        config: &OffsyncConfig,
        store: QueueStore,
        registrar: Arc<dyn SyncRegistrar>,
    ) -> Self {
        Self {
            api_origin: config.api_origin(),
            http: config.http_client(),
            store,
            registrar,
            clock: MonotonicClock::new(),
        }
    }

    /// Only methods the queue can hold; everything else is bypassed.
    pub fn intercepts(&self, request: &InterceptedRequest) -> bool {
        if QueueMethod::try_from(&request.method).is_err() {
            return false;
        }
        Url::parse(&request.url)
            .map(|u| u.origin() == self.api_origin)
            .unwrap_or(false)
    }

    /// Try the network first; on a transport failure queue the request and
    /// answer with a synthetic 202 right away.
    pub async fn handle(&self, request: InterceptedRequest) -> Result<FetchOutcome> {
        if !self.intercepts(&request) {
            return Ok(FetchOutcome::Bypassed(request));
        }

        match self.forward(&request).await {
            Ok(response) => Ok(FetchOutcome::Network(response)),
            Err(e) => {
                tracing::info!(
                    "[SW-FETCH] {} {} failed ({}), queueing",
                    request.method,
                    request.url,
                    e
                );
                let receipt = self.enqueue(&request)?;
                Ok(FetchOutcome::Queued {
                    receipt,
                    response: InterceptedResponse::queued(),
                })
            }
        }
    }

    async fn forward(&self, request: &InterceptedRequest) -> Result<InterceptedResponse> {
        let mut builder = self.http.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| OffsyncError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
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
        let body = response
            .bytes()
            .await
            .map_err(|e| OffsyncError::Transport(e.to_string()))?
            .to_vec();

        Ok(InterceptedResponse {
            status,
            headers,
            body,
        })
    }

    fn enqueue(&self, request: &InterceptedRequest) -> Result<QueueReceipt> {
        let method = QueueMethod::try_from(&request.method)?;
        let record = QueuedRequest::with_clock(
            &self.clock,
            request.url.clone(),
            method,
            request.json_body(),
            request.flattened_headers(),
        );

        if let Err(e) = self.store.add(&record) {
            tracing::error!("[SW-FETCH] could not queue {}: {}", request.url, e);
            return Err(e);
        }

        if let Err(e) = self.registrar.register(QUEUE_SYNC_TAG) {
            tracing::debug!("[SW-FETCH] sync registration failed: {}", e);
        }

        Ok(QueueReceipt {
            id: record.id,
            queued_at: Utc::now(),
            url: request.url.clone(),
        })
    }
}
