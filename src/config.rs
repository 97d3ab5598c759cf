use crate::error::{OffsyncError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsyncConfig {
    pub api_base_url: String,
    pub data_dir: PathBuf,
    pub refresh_path: String,
    pub login_path: String,
    pub health_path: String,
    pub probe_interval_secs: u64,
    /// No transport timeout unless set.
    pub request_timeout_secs: Option<u64>,
}

impl OffsyncConfig {
    /// Defaults for everything but the two values every deployment sets.
    pub fn new(api_base_url: &str, data_dir: impl Into<PathBuf>) -> Result<Self> {
        let api_base_url = validate_base_url(api_base_url)?;
        Ok(Self {
            api_base_url,
            data_dir: data_dir.into(),
            refresh_path: "/users/refresh".into(),
            login_path: "/users/login".into(),
            health_path: "/api/health".into(),
            probe_interval_secs: 5,
            request_timeout_secs: None,
        })
    }

    /// Load configuration from `OFFSYNC_*` environment variables.
    ///
    /// Every variable is optional:
    /// `OFFSYNC_API_BASE_URL` (default `http://localhost:3000`),
    /// `OFFSYNC_DATA_DIR` (default `./data`),
    /// `OFFSYNC_REFRESH_PATH`, `OFFSYNC_LOGIN_PATH`, `OFFSYNC_HEALTH_PATH`,
    /// `OFFSYNC_PROBE_INTERVAL_SECS` (default 5),
    /// `OFFSYNC_REQUEST_TIMEOUT_SECS` (default unset).
    pub fn from_env() -> Result<Self> {
        let base =
            env::var("OFFSYNC_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.into());
        let data_dir = env::var("OFFSYNC_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let mut config = Self::new(&base, data_dir)?;

        if let Ok(p) = env::var("OFFSYNC_REFRESH_PATH") {
            config.refresh_path = p;
        }
        if let Ok(p) = env::var("OFFSYNC_LOGIN_PATH") {
            config.login_path = p;
        }
        if let Ok(p) = env::var("OFFSYNC_HEALTH_PATH") {
            config.health_path = p;
        }
        if let Ok(v) = env::var("OFFSYNC_PROBE_INTERVAL_SECS") {
            config.probe_interval_secs = parse_secs("OFFSYNC_PROBE_INTERVAL_SECS", &v)?;
        }
        if let Ok(v) = env::var("OFFSYNC_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = Some(parse_secs("OFFSYNC_REQUEST_TIMEOUT_SECS", &v)?);
        }

        tracing::info!(
            "Loaded config: api_base_url={}, data_dir={:?}",
            config.api_base_url,
            config.data_dir
        );
        Ok(config)
    }

    /// Absolute URL for an API path.
    pub fn endpoint(&self, path: &str) -> String {
        join_url(&self.api_base_url, path)
    }

    pub fn api_origin(&self) -> url::Origin {
        // Validated in `new`.
        Url::parse(&self.api_base_url)
            .map(|u| u.origin())
            .unwrap_or_else(|_| url::Origin::new_opaque())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    /// Build the HTTP client every context uses, honouring the optional timeout.
    pub fn http_client(&self) -> reqwest::Client {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build().unwrap_or_else(|_| reqwest::Client::new())
    }
}

/// Concatenate base and path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn validate_base_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw)
        .map_err(|e| OffsyncError::Config(format!("Invalid API base URL {}: {}", raw, e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(OffsyncError::Config(format!(
            "API base URL must use http or https, got: {}",
            raw
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_secs(name: &str, raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| OffsyncError::Config(format!("Invalid {}: {}", name, raw)))
}
