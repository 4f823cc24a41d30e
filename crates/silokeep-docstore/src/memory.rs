//! MemoryStore — in-process document store.
//!
//! Collections live in a shared map behind one lock. Each primitive holds
//! the lock for its whole read-modify-write with no await point inside, so
//! a dropped future leaves a document either fully written or untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Document, ID_FIELD, document_id};
use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::index::{IndexModel, check_catalog};
use crate::store::{DocumentStore, WriteOutcome};

#[derive(Default)]
struct Collection {
    docs: BTreeMap<String, Document>,
    indexes: Vec<IndexModel>,
}

impl Collection {
    fn first_match(&self, filter: &Filter) -> Option<String> {
        if let Some(id) = filter.pinned_id() {
            return self
                .docs
                .get(id)
                .filter(|doc| filter.matches(doc))
                .map(|_| id.to_string());
        }
        self.docs
            .iter()
            .find(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id.clone())
    }
}

/// Thread-safe in-memory document store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryStore {
    async fn len(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map_or(0, |c| c.docs.len())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<WriteOutcome> {
        let id = document_id(&doc)?.to_string();
        let mut collections = self.collections.write().await;
        let coll = collections.entry(collection.to_string()).or_default();
        if coll.docs.contains_key(&id) {
            debug!(%collection, %id, "insert rejected: duplicate key");
            return Ok(WriteOutcome::DuplicateKey);
        }
        coll.docs.insert(id, doc);
        Ok(WriteOutcome::Applied)
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        doc: Document,
        upsert: bool,
    ) -> StoreResult<WriteOutcome> {
        let id = document_id(&doc)?.to_string();
        let mut collections = self.collections.write().await;
        if !upsert && !collections.contains_key(collection) {
            return Ok(WriteOutcome::NotMatched);
        }
        let coll = collections.entry(collection.to_string()).or_default();

        match coll.first_match(filter) {
            Some(matched) if matched != id => Err(StoreError::InvalidDocument(format!(
                "replacement would change {ID_FIELD} from {matched:?} to {id:?}"
            ))),
            Some(matched) => {
                coll.docs.insert(matched, doc);
                Ok(WriteOutcome::Applied)
            }
            None if !upsert => Ok(WriteOutcome::NotMatched),
            None if coll.docs.contains_key(&id) => Ok(WriteOutcome::DuplicateKey),
            None => {
                coll.docs.insert(id, doc);
                Ok(WriteOutcome::Applied)
            }
        }
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write().await;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(None);
        };
        Ok(coll.first_match(filter).and_then(|id| coll.docs.remove(&id)))
    }

    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> StoreResult<u64> {
        if set.contains_key(ID_FIELD) {
            return Err(StoreError::InvalidDocument(format!("cannot update {ID_FIELD}")));
        }
        let mut collections = self.collections.write().await;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let Some(id) = coll.first_match(filter) else {
            return Ok(0);
        };
        if let Some(doc) = coll.docs.get_mut(&id) {
            doc.extend(set);
        }
        Ok(1)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = coll.docs.len();
        coll.docs.retain(|_, doc| !filter.matches(doc));
        Ok((before - coll.docs.len()) as u64)
    }

    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(coll
            .docs
            .values()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        let coll = collections.entry(collection.to_string()).or_default();
        if check_catalog(collection, &coll.indexes, &index)? {
            debug!(%collection, index = %index.effective_name(), "index created");
            coll.indexes.push(index);
        }
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn insert_then_find() {
        let store = MemoryStore::new();
        let outcome = store
            .insert_one("silos", doc(json!({ "_id": "a", "Status": 1 })))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);

        let found = store.find("silos", &Filter::id("a")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["Status"], 1);
    }

    #[tokio::test]
    async fn duplicate_insert_is_reported_not_raised() {
        let store = MemoryStore::new();
        store.insert_one("silos", doc(json!({ "_id": "a" }))).await.unwrap();
        let outcome = store.insert_one("silos", doc(json!({ "_id": "a" }))).await.unwrap();
        assert_eq!(outcome, WriteOutcome::DuplicateKey);
        assert_eq!(store.len("silos").await, 1);
    }

    #[tokio::test]
    async fn insert_without_id_is_invalid() {
        let store = MemoryStore::new();
        let err = store.insert_one("silos", doc(json!({ "x": 1 }))).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn conditional_replace() {
        let store = MemoryStore::new();
        store
            .insert_one("silos", doc(json!({ "_id": "a", "Etag": "v1" })))
            .await
            .unwrap();

        let cas = Filter::id("a").and(Filter::eq("Etag", "v1"));
        let outcome = store
            .replace_one("silos", &cas, doc(json!({ "_id": "a", "Etag": "v2" })), false)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);

        // Same predicate again is now stale.
        let outcome = store
            .replace_one("silos", &cas, doc(json!({ "_id": "a", "Etag": "v3" })), false)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::NotMatched);

        let found = store.find("silos", &Filter::id("a")).await.unwrap();
        assert_eq!(found[0]["Etag"], "v2");
    }

    #[tokio::test]
    async fn upsert_miss_on_existing_id_is_duplicate_key() {
        let store = MemoryStore::new();
        store
            .insert_one("silos", doc(json!({ "_id": "a", "Etag": "v1" })))
            .await
            .unwrap();
        let cas = Filter::id("a").and(Filter::eq("Etag", "stale"));
        let outcome = store
            .replace_one("silos", &cas, doc(json!({ "_id": "a", "Etag": "v2" })), true)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::DuplicateKey);
    }

    #[tokio::test]
    async fn upsert_miss_inserts() {
        let store = MemoryStore::new();
        let outcome = store
            .replace_one("silos", &Filter::id("b"), doc(json!({ "_id": "b" })), true)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);
        assert_eq!(store.len("silos").await, 1);
    }

    #[tokio::test]
    async fn replace_cannot_change_id() {
        let store = MemoryStore::new();
        store.insert_one("silos", doc(json!({ "_id": "a" }))).await.unwrap();
        let err = store
            .replace_one("silos", &Filter::id("a"), doc(json!({ "_id": "b" })), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn update_sets_fields_only() {
        let store = MemoryStore::new();
        store
            .insert_one("silos", doc(json!({ "_id": "a", "IAmAliveTime": 1, "Status": 3 })))
            .await
            .unwrap();
        let modified = store
            .update_one("silos", &Filter::id("a"), doc(json!({ "IAmAliveTime": 99 })))
            .await
            .unwrap();
        assert_eq!(modified, 1);
        let found = store.find("silos", &Filter::id("a")).await.unwrap();
        assert_eq!(found[0]["IAmAliveTime"], 99);
        assert_eq!(found[0]["Status"], 3);

        let modified = store
            .update_one("silos", &Filter::id("zzz"), doc(json!({ "IAmAliveTime": 1 })))
            .await
            .unwrap();
        assert_eq!(modified, 0);
    }

    #[tokio::test]
    async fn delete_one_and_many() {
        let store = MemoryStore::new();
        for (id, status) in [("a", 6), ("b", 6), ("c", 3)] {
            store
                .insert_one("silos", doc(json!({ "_id": id, "Status": status })))
                .await
                .unwrap();
        }
        let removed = store.delete_one("silos", &Filter::id("c")).await.unwrap();
        assert_eq!(removed.unwrap()["Status"], 3);
        assert!(store.delete_one("silos", &Filter::id("c")).await.unwrap().is_none());

        let count = store.delete_many("silos", &Filter::eq("Status", 6)).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.len("silos").await, 0);
    }

    #[tokio::test]
    async fn missing_collection_reads_empty() {
        let store = MemoryStore::new();
        assert!(store.find("nope", &Filter::All).await.unwrap().is_empty());
        assert_eq!(store.delete_many("nope", &Filter::All).await.unwrap(), 0);
        assert!(store.list_indexes("nope").await.unwrap().is_empty());
        assert_eq!(store.len("nope").await, 0);
    }

    #[tokio::test]
    async fn index_creation_is_idempotent() {
        let store = MemoryStore::new();
        let idx = IndexModel::new().named("by_deployment").ascending("DeploymentId");
        store.create_index("silos", idx.clone()).await.unwrap();
        store.create_index("silos", idx).await.unwrap();
        assert_eq!(store.list_indexes("silos").await.unwrap().len(), 1);

        let err = store
            .create_index("silos", IndexModel::new().named("other").ascending("DeploymentId"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IndexOptionsConflict { .. }));
    }
}
