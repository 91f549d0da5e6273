//! Error types for the local store.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend refused a read or write.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] hsesync_storage::StorageError),

    /// A filesystem operation on the store directory failed.
    #[error("storage unavailable: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// The log contains bytes that are not a valid record.
    #[error("log corrupted: {message}")]
    Corrupted {
        /// What was wrong and where.
        message: String,
    },

    /// A record's checksum does not match its bytes.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the record in the log.
        offset: u64,
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed from the bytes.
        actual: u32,
    },

    /// A record value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A record has no usable key.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Why the record was rejected.
        message: String,
    },

    /// The partition was not declared when the store was opened.
    #[error("unknown partition: {name}")]
    UnknownPartition {
        /// The partition name.
        name: String,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// True when the failure means the store cannot persist anything at all,
    /// as opposed to a problem with one record or one call.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_)
                | Self::Io(_)
                | Self::Locked
                | Self::Corrupted { .. }
                | Self::ChecksumMismatch { .. }
                | Self::Closed
        )
    }
}
