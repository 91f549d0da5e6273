//! # hsesync store
//!
//! The local durable store of the offline subsystem.
//!
//! This crate provides:
//! - an append-only, checksummed transaction log over a
//!   [`hsesync_storage::StorageBackend`]
//! - crash recovery that replays committed transactions only
//! - named partitions of JSON records keyed by string
//! - atomic multi-write transactions (a cache refresh is one)
//! - log compaction and an offline verifier
//!
//! ```rust
//! use hsesync_store::{LocalStore, StoreConfig};
//! use serde_json::json;
//!
//! let store = LocalStore::open_in_memory(
//!     StoreConfig::new().partitions(["pending_operations", "incidents"]),
//! )
//! .unwrap();
//!
//! store
//!     .transaction(|txn| {
//!         txn.clear("incidents")?;
//!         txn.put("incidents", json!({"id": "i-1", "title": "Forklift near miss"}))?;
//!         txn.put("incidents", json!({"id": "i-2", "title": "Chemical splash"}))
//!     })
//!     .unwrap();
//!
//! assert_eq!(store.count("incidents").unwrap(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
pub mod log;
mod partition;
mod store;
mod txn;
mod verify;

pub use config::{StoreConfig, DEFAULT_COMPACT_THRESHOLD};
pub use dir::{StoreDir, LOG_FILE};
pub use error::{StoreError, StoreResult};
pub use partition::{validate_partition_name, MAX_PARTITION_NAME_LEN};
pub use store::{CompactionStats, LocalStore, StoreStats};
pub use txn::{record_key, Transaction, WriteOp};
pub use verify::{verify, verify_backend, VerifyReport};
