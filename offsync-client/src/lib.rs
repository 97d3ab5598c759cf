//! Page-side network interceptor.
//!
//! Every call the UI makes goes through [`ApiClient`]. Mutating calls that
//! fail at the transport level while offline are persisted to the shared
//! queue and answered with [`offsync::SendOutcome::Queued`]; 401 responses
//! get one refresh-and-retry through [`TokenRefresher`].

pub mod client;
pub mod login;
pub mod refresh;

pub use client::{ApiClient, ApiRequest};
pub use login::{LoginRequest, LoginResponse};
pub use refresh::{RefreshResponse, TokenRefresher};
