use crate::error::{OffsyncError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

/// Status reported to callers whose mutation was queued instead of sent.
pub const QUEUED_STATUS: u16 = 202;
pub const QUEUED_STATUS_TEXT: &str = "Accepted (queued)";

/// The mutating verbs that may be queued. GET is never representable here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueMethod {
    Post,
    Put,
    Delete,
}

impl QueueMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueMethod::Post => "POST",
            QueueMethod::Put => "PUT",
            QueueMethod::Delete => "DELETE",
        }
    }

    pub fn to_http(self) -> http::Method {
        match self {
            QueueMethod::Post => http::Method::POST,
            QueueMethod::Put => http::Method::PUT,
            QueueMethod::Delete => http::Method::DELETE,
        }
    }
}

impl fmt::Display for QueueMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueMethod {
    type Err = OffsyncError;

    // Page-side writers historically stored lowercase verbs, the worker
    // uppercase ones; both must load.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "POST" => Ok(QueueMethod::Post),
            "PUT" => Ok(QueueMethod::Put),
            "DELETE" => Ok(QueueMethod::Delete),
            other => Err(OffsyncError::InvalidRequest(format!(
                "method {} is not queueable",
                other
            ))),
        }
    }
}

impl TryFrom<&http::Method> for QueueMethod {
    type Error = OffsyncError;

    fn try_from(method: &http::Method) -> Result<Self> {
        method.as_str().parse()
    }
}

impl Serialize for QueueMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for QueueMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A mutating call that could not be sent and is waiting for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub id: String,
    pub url: String,
    pub method: QueueMethod,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Milliseconds since the Unix epoch, monotonic per writer only.
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

static DEFAULT_CLOCK: MonotonicClock = MonotonicClock::new();

impl QueuedRequest {
    /// Build a record with a fresh id, stamped by the process-wide clock.
    pub fn new(
        url: impl Into<String>,
        method: QueueMethod,
        body: Option<serde_json::Value>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self::with_clock(&DEFAULT_CLOCK, url, method, body, headers)
    }

    pub fn with_clock(
        clock: &MonotonicClock,
        url: impl Into<String>,
        method: QueueMethod,
        body: Option<serde_json::Value>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            method,
            body,
            headers,
            created_at: clock.next_millis(),
        }
    }

    /// Serialized body as sent on the wire, or `None` when there is nothing to send.
    pub fn wire_body(&self) -> Result<Option<Vec<u8>>> {
        match &self.body {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::to_vec(value)?)),
        }
    }
}

/// Millisecond clock that never repeats or goes backwards for one writer.
#[derive(Debug)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    pub fn next_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = if now > prev { now } else { prev + 1 };
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A response that actually came back from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Proof that a mutation was persisted for later replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueReceipt {
    pub id: String,
    #[serde(rename = "queuedAt")]
    pub queued_at: DateTime<Utc>,
    /// Path the caller originally asked for.
    pub url: String,
}

impl QueueReceipt {
    /// The response shape callers written against plain HTTP expect.
    pub fn to_response(&self) -> ApiResponse {
        ApiResponse {
            status: QUEUED_STATUS,
            status_text: QUEUED_STATUS_TEXT.to_string(),
            headers: BTreeMap::new(),
            body: serde_json::json!({
                "queuedAt": self.queued_at.to_rfc3339(),
                "url": self.url,
            }),
        }
    }
}

/// Outcome of a call through the network interceptor.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Sent(ApiResponse),
    Queued(QueueReceipt),
}

impl SendOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, SendOutcome::Queued(_))
    }

    /// Collapse into a response, synthesizing one for queued calls.
    pub fn into_response(self) -> ApiResponse {
        match self {
            SendOutcome::Sent(resp) => resp,
            SendOutcome::Queued(receipt) => receipt.to_response(),
        }
    }
}
