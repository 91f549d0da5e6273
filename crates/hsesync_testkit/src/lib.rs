//! # hsesync testkit
//!
//! Test utilities for hsesync.
//!
//! This crate provides:
//! - Store fixtures that clean up after themselves and can be reopened
//! - An engine harness wired to a mock remote, a host-driven connectivity
//!   monitor and a recording notifier
//! - Property-based generators for documents and queue operations
//! - A fault-injecting storage backend for crash recovery tests
//! - Sample HSE records
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hsesync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn queued_writes_reach_the_remote() {
//!     let h = EngineHarness::online();
//!     h.writer.insert_record(&samples::incident("i-1")).unwrap();
//!     h.engine.flush_now().await.unwrap();
//!     assert_eq!(h.remote.calls().len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod samples;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::samples;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
