//! Error types for the silokeep document store.

use thiserror::Error;

/// Result type alias for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during document store operations.
///
/// A conditional write that does not match is not an error; see
/// [`WriteOutcome`](crate::WriteOutcome).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    /// An equivalent index already exists under another name.
    #[error("index {requested:?} on {collection} conflicts with existing index {existing:?}")]
    IndexOptionsConflict {
        collection: String,
        requested: String,
        existing: String,
    },

    /// An index with this name exists but covers different keys.
    #[error("index {name:?} on {collection} already exists with different keys")]
    IndexNameConflict { collection: String, name: String },
}

impl StoreError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}
