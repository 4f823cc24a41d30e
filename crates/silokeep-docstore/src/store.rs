//! The document store contract.

use async_trait::async_trait;

use crate::document::Document;
use crate::error::StoreResult;
use crate::filter::Filter;
use crate::index::IndexModel;

/// Outcome of a single-document conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied.
    Applied,
    /// No document matched the filter and nothing was written.
    NotMatched,
    /// The write would have created a second document with an existing `_id`.
    DuplicateKey,
}

/// Single-document atomic primitives over named collections.
///
/// Every method is atomic with respect to the one document it touches (bulk
/// methods are atomic per document only). Collections come into existence on
/// first write; reading a missing collection yields nothing.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert `doc`. Reports `DuplicateKey` if its `_id` is taken.
    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<WriteOutcome>;

    /// Replace the first document matching `filter` with `doc`.
    ///
    /// With `upsert`, a miss inserts `doc` instead; that insert reports
    /// `DuplicateKey` when a document with the same `_id` exists but did not
    /// match the filter.
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        doc: Document,
        upsert: bool,
    ) -> StoreResult<WriteOutcome>;

    /// Atomically remove and return the first document matching `filter`.
    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;

    /// Overwrite the given fields on the first matching document.
    /// Returns the number of documents modified (0 or 1).
    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> StoreResult<u64>;

    /// Remove every matching document. Returns how many were removed.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Return every matching document, ordered by `_id`.
    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>>;

    /// Register a secondary index. Creating an identical index is a no-op.
    async fn create_index(&self, collection: &str, index: IndexModel) -> StoreResult<()>;

    /// List the secondary indexes registered on a collection.
    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>>;
}
