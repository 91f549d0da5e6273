//! # hsesync engine
//!
//! Offline-first write path and sync replay for the HSE records app.
//!
//! This crate provides:
//! - [`OperationQueue`]: durable FIFO of writes the remote has not confirmed
//! - [`CacheMirror`]: per-collection copy of remote records for offline reads
//! - [`OfflineWriter`]: validate, cache, enqueue, then trigger a flush
//! - [`SyncEngine`]: replays the queue on a timer, on reconnect and on demand
//! - [`RemoteStore`] with [`RestRemote`] (over an injected [`HttpClient`])
//!   and [`MockRemote`]
//! - [`Connectivity`] and [`Notifier`] seams for the host
//!
//! ```rust,no_run
//! use hsesync_engine::{
//!     open_store, ConnectivityMonitor, LogNotifier, MockRemote, OfflineWriter, SyncConfig,
//!     SyncEngine,
//! };
//! use hsesync_model::Incident;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(open_store("./hse-data".as_ref())?);
//! let engine = Arc::new(SyncEngine::new(
//!     SyncConfig::default(),
//!     store,
//!     Arc::new(MockRemote::new()),
//!     Arc::new(ConnectivityMonitor::new(true)),
//!     Arc::new(LogNotifier),
//! ));
//! engine.start()?;
//!
//! let writer = OfflineWriter::new(Arc::clone(&engine));
//! writer.insert_record(&Incident {
//!     id: "i-1".into(),
//!     incident_type: "near_miss".into(),
//!     ..Default::default()
//! })?;
//!
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod connectivity;
mod engine;
mod error;
mod http;
mod notify;
mod queue;
mod remote;
mod writer;

pub use cache::CacheMirror;
pub use config::{SyncConfig, DEFAULT_FLUSH_INTERVAL, DEFAULT_ORGANIZATION_FIELD};
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use engine::{FlushOutcome, FlushReport, SkipReason, SyncEngine, SyncState, SyncStats};
pub use error::{RemoteError, SyncError, SyncResult};
pub use http::{HttpClient, HttpRequest, HttpResponse, Method, RestRemote};
pub use notify::{ChannelNotifier, LogNotifier, Notice, Notifier, RecordingNotifier};
pub use queue::{OperationQueue, QueueHealth};
pub use remote::{Identity, MockRemote, OrgContext, RemoteCall, RemoteStore};
pub use writer::OfflineWriter;

use hsesync_model::Collection;
use hsesync_store::{LocalStore, StoreConfig};
use std::path::Path;

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Partition holding pending operations, keyed by operation id.
pub const PENDING_OPERATIONS: &str = "pending_operations";

/// Partition holding attempt records, keyed by operation id.
pub const SYNC_ATTEMPTS: &str = "sync_attempts";

/// Every partition the subsystem uses: the queue, the attempts and one per
/// collection.
pub fn standard_partitions() -> Vec<String> {
    let mut partitions = vec![PENDING_OPERATIONS.to_string(), SYNC_ATTEMPTS.to_string()];
    partitions.extend(Collection::ALL.iter().map(|c| c.name().to_string()));
    partitions
}

/// Store configuration with the standard partitions.
pub fn store_config() -> StoreConfig {
    StoreConfig::new().partitions(standard_partitions())
}

/// Opens (or creates) the on-disk store at `path`.
///
/// # Errors
///
/// [`SyncError::StorageUnavailable`] if the directory cannot be created,
/// locked or read.
pub fn open_store(path: &Path) -> SyncResult<LocalStore> {
    Ok(LocalStore::open(path, store_config())?)
}

/// Opens an in-memory store with the standard partitions.
///
/// # Errors
///
/// Never fails in practice; the error type is shared with [`open_store`].
pub fn open_store_in_memory() -> SyncResult<LocalStore> {
    Ok(LocalStore::open_in_memory(store_config())?)
}
