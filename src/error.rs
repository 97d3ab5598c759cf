use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum OffsyncError {
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Authentication expired")]
    AuthExpired,

    #[error("Authentication invalid: {source}")]
    AuthInvalid {
        #[source]
        source: Box<OffsyncError>,
    },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Replay failed for queued request {id}: {reason}")]
    ReplayFailure { id: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OffsyncError>;

impl From<std::io::Error> for OffsyncError {
    fn from(e: std::io::Error) -> Self {
        OffsyncError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for OffsyncError {
    fn from(e: serde_json::Error) -> Self {
        OffsyncError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for OffsyncError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => OffsyncError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            },
            None if e.is_decode() => OffsyncError::Json(e.to_string()),
            None => OffsyncError::Transport(e.to_string()),
        }
    }
}

impl OffsyncError {
    pub fn auth_invalid(source: OffsyncError) -> Self {
        OffsyncError::AuthInvalid {
            source: Box::new(source),
        }
    }

    /// True for failures where no HTTP response was received at all.
    pub fn is_network_failure(&self) -> bool {
        matches!(
            self,
            OffsyncError::NetworkUnavailable(_) | OffsyncError::Transport(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OffsyncError::NetworkUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            OffsyncError::Transport(_) => StatusCode::BAD_GATEWAY,
            OffsyncError::Status { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            OffsyncError::AuthExpired => StatusCode::UNAUTHORIZED,
            OffsyncError::AuthInvalid { .. } => StatusCode::UNAUTHORIZED,
            OffsyncError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OffsyncError::ReplayFailure { .. } => StatusCode::BAD_GATEWAY,
            OffsyncError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OffsyncError::Json(_) => StatusCode::BAD_REQUEST,
            OffsyncError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OffsyncError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
