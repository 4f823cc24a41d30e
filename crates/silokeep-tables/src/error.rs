//! Table engine error types.

use silokeep_docstore::StoreError;
use thiserror::Error;

/// Errors that can occur during table operations.
///
/// Losing a compare-and-set race is not an error; engines report it as a
/// negative result.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("document store error: {0}")]
    Store(#[from] StoreError),

    #[error("malformed document {id:?}: {reason}")]
    Mapping { id: String, reason: String },
}

impl TableError {
    pub(crate) fn mapping(id: &str, reason: impl ToString) -> Self {
        TableError::Mapping {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller may retry the same operation after backing off.
    pub fn is_retryable(&self) -> bool {
        match self {
            TableError::Store(e) => e.is_transient(),
            TableError::Mapping { .. } => false,
        }
    }
}

pub type TableResult<T> = Result<T, TableError>;
