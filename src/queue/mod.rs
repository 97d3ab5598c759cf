//! Durable request queue and the signals built around it.

pub mod bus;
pub mod hub;
pub mod pending;
pub mod store;

use crate::error::Result;

/// Background-sync tag under which replay opportunities are requested.
pub const QUEUE_SYNC_TAG: &str = "api-queue";

/// Directory (under the data dir) holding one file per queued record.
pub const QUEUE_STORE_NAME: &str = "request-queue";

/// Asks the worker context for a replay opportunity under `tag`.
///
/// Implemented by the worker's sync manager; the page side only holds it
/// behind this trait so the two crates stay independent.
pub trait SyncRegistrar: Send + Sync {
    fn register(&self, tag: &str) -> Result<()>;
}
