//! Document representation.

use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};

/// A stored document: a JSON object with a unique string `_id`.
pub type Document = Map<String, Value>;

/// Primary key field present on every document.
pub const ID_FIELD: &str = "_id";

/// Extract the `_id` of a document.
pub fn document_id(doc: &Document) -> StoreResult<&str> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidDocument("missing string _id".to_string()))
}

/// Encode a document for a byte-oriented backend.
pub fn to_bytes(doc: &Document) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(doc).map_err(|e| StoreError::Serialize(e.to_string()))
}

/// Decode a document written by [`to_bytes`].
pub fn from_bytes(bytes: &[u8]) -> StoreResult<Document> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Deserialize(e.to_string()))
}
