//! Error types for the sync engine.

use hsesync_model::{Collection, ModelError, OperationKind};
use hsesync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while queueing or replaying operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No signed-in user; the flush was aborted before any replay.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// The user's organization could not be resolved; the flush was aborted.
    #[error("organization context unavailable: {0}")]
    ContextResolutionFailed(String),

    /// The remote rejected one operation. The operation stays queued.
    #[error("{kind} {op_id} on {collection} failed: {source}")]
    RemoteOperationFailed {
        /// The pending operation.
        op_id: String,
        /// Its collection.
        collection: Collection,
        /// Its kind.
        kind: OperationKind,
        /// What the remote said.
        #[source]
        source: RemoteError,
    },

    /// The local store failed. Nothing after this point was persisted.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    /// A document or stored operation was rejected.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// `start` was called on an engine that is already running.
    #[error("sync engine already running")]
    AlreadyRunning,

    /// `start` was called outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// The configuration cannot drive the background loop.
    #[error("invalid sync configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// True when the flush was aborted before replaying anything.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            SyncError::NotAuthenticated(_) | SyncError::ContextResolutionFailed(_)
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Model(ModelError::from(err))
    }
}

/// A failed call to the remote record store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The request never got an answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The answer could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be built from the operation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    /// Creates a status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Returns true if sending the same request again could succeed.
    ///
    /// The engine retries every failure on the next flush regardless; this
    /// only informs logging and alerting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport(_) => true,
            RemoteError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            RemoteError::InvalidResponse(_) | RemoteError::InvalidRequest(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(RemoteError::transport("connection reset").is_retryable());
        assert!(RemoteError::status(503, "unavailable").is_retryable());
        assert!(RemoteError::status(429, "slow down").is_retryable());
        assert!(!RemoteError::status(409, "duplicate key").is_retryable());
        assert!(!RemoteError::InvalidResponse("not json".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::RemoteOperationFailed {
            op_id: "op-7".into(),
            collection: Collection::Incidents,
            kind: OperationKind::Insert,
            source: RemoteError::status(400, "null value in column \"type\""),
        };
        let text = err.to_string();
        assert!(text.contains("insert op-7 on incidents"));
        assert!(text.contains("HTTP 400"));
    }

    #[test]
    fn aborts() {
        assert!(SyncError::NotAuthenticated("no session".into()).is_abort());
        assert!(SyncError::ContextResolutionFailed("no profile".into()).is_abort());
        assert!(!SyncError::AlreadyRunning.is_abort());
    }
}
