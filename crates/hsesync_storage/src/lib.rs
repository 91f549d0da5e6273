//! # hsesync storage
//!
//! Byte-level backends underneath the hsesync local store.
//!
//! A backend is an append-only byte sink with random-access reads. It knows
//! nothing about log framing, partitions or records; the store crate owns
//! every byte of interpretation.
//!
//! - [`InMemoryBackend`] keeps bytes in a `Vec`, for tests and ephemeral stores
//! - [`FileBackend`] keeps bytes in a single OS file and survives restarts
//!
//! ```rust
//! use hsesync_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let at = backend.append(b"pending").unwrap();
//! assert_eq!(backend.read_at(at, 7).unwrap(), b"pending");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
