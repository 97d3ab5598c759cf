//! # Offsync
//!
//! Offline request queue for record-management clients. Mutating API calls
//! that cannot reach the server are persisted to a durable queue and replayed
//! once connectivity returns.
//!
//! This crate holds everything the two execution contexts share:
//!
//! - the persisted data model ([`QueuedRequest`]) and the durable
//!   [`QueueStore`] both contexts write into,
//! - the in-process [`QueueChangeBus`] and the [`PendingTracker`] built on it,
//! - the [`ClientHub`] carrying worker-to-page messages,
//! - the [`SessionStore`] holding the current [`AuthSession`],
//! - configuration and connectivity abstractions.
//!
//! The page-side interceptor lives in `offsync-client`; the background fetch
//! interceptor and the sync replayer live in `offsync-worker`. The two crates
//! never share memory, only the store directory.
//!
//! ```rust,no_run
//! use offsync::{QueueMethod, QueueStore, QueuedRequest};
//! use serde_json::json;
//! use std::collections::BTreeMap;
//!
//! # fn main() -> offsync::Result<()> {
//! let store = QueueStore::open("./data")?;
//! store.add(&QueuedRequest::new(
//!     "http://localhost:3000/clientes",
//!     QueueMethod::Post,
//!     Some(json!({"razaoSocial": "Acme"})),
//!     BTreeMap::new(),
//! ))?;
//! assert_eq!(store.len()?, 1);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod queue;
pub mod types;

pub use auth::{AuthSession, AuthUser, LoginPayload, SessionStore, Technician, TokenType};
pub use config::OffsyncConfig;
pub use connectivity::{
    ConnectivitySignal, HealthProbe, ManualTrigger, NetworkStatus, ReconnectTrigger,
};
pub use error::{OffsyncError, Result};
pub use queue::bus::{QueueChangeBus, Subscription};
pub use queue::hub::{ClientHub, WorkerMessage};
pub use queue::pending::{Pending, PendingTracker};
pub use queue::store::QueueStore;
pub use queue::{SyncRegistrar, QUEUE_STORE_NAME, QUEUE_SYNC_TAG};
pub use types::*;
