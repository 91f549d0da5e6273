//! Model errors.

use thiserror::Error;

/// Result alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while naming collections or validating documents.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The name is not one of the known collections.
    #[error("unknown collection: {name}")]
    UnknownCollection {
        /// The rejected name.
        name: String,
    },

    /// The name is not one of `insert`, `update`, `delete`.
    #[error("unknown operation kind: {name}")]
    UnknownKind {
        /// The rejected name.
        name: String,
    },

    /// A document does not fit what its collection and kind require.
    #[error("invalid document for {collection}: {reason}")]
    InvalidDocument {
        /// Target collection.
        collection: String,
        /// What was wrong.
        reason: String,
    },

    /// A value could not be converted to or from JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    /// Creates an invalid document error.
    pub fn invalid(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            collection: collection.into(),
            reason: reason.into(),
        }
    }
}
