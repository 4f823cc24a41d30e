//! RedbStore — redb-backed document store.
//!
//! Each collection is a redb table of JSON-encoded documents keyed by
//! `_id`. Every primitive runs inside exactly one write (or read)
//! transaction, so each single-document operation is atomic and durable on
//! commit. Multi-document operations are not grouped into one logical unit
//! by callers; they only see per-document guarantees.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::document::{Document, ID_FIELD, document_id, from_bytes, to_bytes};
use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::index::{IndexModel, check_catalog};
use crate::store::{DocumentStore, WriteOutcome};
use crate::tables::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe document store backed by redb.
///
/// Transactions run synchronously on the calling task, and a write commit
/// blocks the worker thread until the file is synced. Embedders with heavy
/// write load or a current-thread runtime should expect writes to stall
/// other tasks on that thread for the duration of an fsync.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_catalog()?;
        debug!(?path, "document store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_catalog()?;
        debug!("in-memory document store opened");
        Ok(store)
    }

    fn ensure_catalog(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(INDEX_CATALOG).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Run a read-only closure over a collection table.
    /// A collection that was never written reads as `empty`.
    fn with_read_table<R>(
        &self,
        collection: &str,
        empty: R,
        f: impl FnOnce(&redb::ReadOnlyTable<&'static str, &'static [u8]>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let table_name = collection_table_name(collection);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = match txn.open_table(collection_table(&table_name)) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(empty),
            Err(e) => return Err(StoreError::Table(e.to_string())),
        };
        f(&table)
    }

    /// Run a read-write closure over a collection table and commit.
    fn with_write_table<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut redb::Table<&'static str, &'static [u8]>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let table_name = collection_table_name(collection);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let result = {
            let mut table = txn
                .open_table(collection_table(&table_name))
                .map_err(map_err!(Table))?;
            f(&mut table)?
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(result)
    }

    fn load_catalog(&self, collection: &str) -> StoreResult<Vec<IndexModel>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INDEX_CATALOG).map_err(map_err!(Table))?;
        match table.get(collection).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize)),
            None => Ok(Vec::new()),
        }
    }
}

/// Collect documents matching `filter`, stopping after the first when `first_only`.
fn scan<T>(table: &T, filter: &Filter, first_only: bool) -> StoreResult<Vec<(String, Document)>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    if let Some(id) = filter.pinned_id() {
        return match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let doc = from_bytes(guard.value())?;
                Ok(if filter.matches(&doc) {
                    vec![(id.to_string(), doc)]
                } else {
                    Vec::new()
                })
            }
            None => Ok(Vec::new()),
        };
    }

    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        let doc = from_bytes(value.value())?;
        if filter.matches(&doc) {
            results.push((key.value().to_string(), doc));
            if first_only {
                break;
            }
        }
    }
    Ok(results)
}

fn first_match<T>(table: &T, filter: &Filter) -> StoreResult<Option<(String, Document)>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    Ok(scan(table, filter, true)?.into_iter().next())
}

#[async_trait]
impl DocumentStore for RedbStore {
    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<WriteOutcome> {
        let id = document_id(&doc)?.to_string();
        let value = to_bytes(&doc)?;
        self.with_write_table(collection, |table| {
            if table.get(id.as_str()).map_err(map_err!(Read))?.is_some() {
                return Ok(WriteOutcome::DuplicateKey);
            }
            table
                .insert(id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            Ok(WriteOutcome::Applied)
        })
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        doc: Document,
        upsert: bool,
    ) -> StoreResult<WriteOutcome> {
        let id = document_id(&doc)?.to_string();
        let value = to_bytes(&doc)?;
        self.with_write_table(collection, |table| {
            match first_match(&*table, filter)? {
                Some((matched, _)) if matched != id => Err(StoreError::InvalidDocument(format!(
                    "replacement would change {ID_FIELD} from {matched:?} to {id:?}"
                ))),
                Some(_) => {
                    table
                        .insert(id.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    Ok(WriteOutcome::Applied)
                }
                None if !upsert => Ok(WriteOutcome::NotMatched),
                None => {
                    if table.get(id.as_str()).map_err(map_err!(Read))?.is_some() {
                        return Ok(WriteOutcome::DuplicateKey);
                    }
                    table
                        .insert(id.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    Ok(WriteOutcome::Applied)
                }
            }
        })
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        self.with_write_table(collection, |table| {
            let Some((id, doc)) = first_match(&*table, filter)? else {
                return Ok(None);
            };
            table.remove(id.as_str()).map_err(map_err!(Write))?;
            Ok(Some(doc))
        })
    }

    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> StoreResult<u64> {
        if set.contains_key(ID_FIELD) {
            return Err(StoreError::InvalidDocument(format!("cannot update {ID_FIELD}")));
        }
        self.with_write_table(collection, |table| {
            let Some((id, mut doc)) = first_match(&*table, filter)? else {
                return Ok(0);
            };
            doc.extend(set);
            let value = to_bytes(&doc)?;
            table
                .insert(id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            Ok(1)
        })
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let removed = self.with_write_table(collection, |table| {
            let matched = scan(&*table, filter, false)?;
            for (id, _) in &matched {
                table.remove(id.as_str()).map_err(map_err!(Write))?;
            }
            Ok(matched.len() as u64)
        })?;
        debug!(%collection, removed, "documents deleted");
        Ok(removed)
    }

    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.with_read_table(collection, Vec::new(), |table| {
            Ok(scan(table, filter, false)?
                .into_iter()
                .map(|(_, doc)| doc)
                .collect())
        })
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INDEX_CATALOG).map_err(map_err!(Table))?;
            let mut catalog: Vec<IndexModel> = match table.get(collection).map_err(map_err!(Read))? {
                Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                None => Vec::new(),
            };
            if check_catalog(collection, &catalog, &index)? {
                debug!(%collection, index = %index.effective_name(), "index created");
                catalog.push(index);
                let value = serde_json::to_vec(&catalog).map_err(map_err!(Serialize))?;
                table
                    .insert(collection, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>> {
        self.load_catalog(collection)
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
    async fn insert_and_find() {
        let store = RedbStore::open_in_memory().unwrap();
        store
            .insert_one("reminders", doc(json!({ "_id": "r1", "GrainHash": 10 })))
            .await
            .unwrap();
        store
            .insert_one("reminders", doc(json!({ "_id": "r2", "GrainHash": 20 })))
            .await
            .unwrap();

        let found = store
            .find("reminders", &Filter::gt("GrainHash", 15))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["_id"], "r2");
    }

    #[tokio::test]
    async fn duplicate_insert_reports_duplicate_key() {
        let store = RedbStore::open_in_memory().unwrap();
        store.insert_one("c", doc(json!({ "_id": "a" }))).await.unwrap();
        let outcome = store.insert_one("c", doc(json!({ "_id": "a" }))).await.unwrap();
        assert_eq!(outcome, WriteOutcome::DuplicateKey);
    }

    #[tokio::test]
    async fn conditional_replace_and_stale_token() {
        let store = RedbStore::open_in_memory().unwrap();
        store
            .insert_one("c", doc(json!({ "_id": "a", "Etag": "v1" })))
            .await
            .unwrap();
        let cas = Filter::id("a").and(Filter::eq("Etag", "v1"));

        let first = store
            .replace_one("c", &cas, doc(json!({ "_id": "a", "Etag": "v2" })), false)
            .await
            .unwrap();
        let second = store
            .replace_one("c", &cas, doc(json!({ "_id": "a", "Etag": "v3" })), false)
            .await
            .unwrap();
        assert_eq!(first, WriteOutcome::Applied);
        assert_eq!(second, WriteOutcome::NotMatched);

        let upserted = store
            .replace_one("c", &cas, doc(json!({ "_id": "a", "Etag": "v4" })), true)
            .await
            .unwrap();
        assert_eq!(upserted, WriteOutcome::DuplicateKey);
    }

    #[tokio::test]
    async fn update_delete_and_bulk_delete() {
        let store = RedbStore::open_in_memory().unwrap();
        for (id, status) in [("a", 6), ("b", 6), ("c", 3)] {
            store
                .insert_one("c", doc(json!({ "_id": id, "Status": status, "IAmAliveTime": 0 })))
                .await
                .unwrap();
        }

        let modified = store
            .update_one("c", &Filter::id("c"), doc(json!({ "IAmAliveTime": 500 })))
            .await
            .unwrap();
        assert_eq!(modified, 1);

        let removed = store.delete_one("c", &Filter::id("c")).await.unwrap().unwrap();
        assert_eq!(removed["IAmAliveTime"], 500);

        let count = store.delete_many("c", &Filter::eq("Status", 6)).await.unwrap();
        assert_eq!(count, 2);
        assert!(store.find("c", &Filter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_collection_is_empty() {
        let store = RedbStore::open_in_memory().unwrap();
        assert!(store.find("never", &Filter::All).await.unwrap().is_empty());
        assert!(store.list_indexes("never").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn index_catalog_persists_and_detects_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store
                .create_index("c", IndexModel::new().named("by_dep").ascending("DeploymentId"))
                .await
                .unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        let indexes = store.list_indexes("c").await.unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].effective_name(), "by_dep");

        let err = store
            .create_index("c", IndexModel::new().ascending("DeploymentId"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IndexOptionsConflict { .. }));
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store
                .insert_one("silos", doc(json!({ "_id": "a", "Status": 3 })))
                .await
                .unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        let found = store.find("silos", &Filter::id("a")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["Status"], 3);
    }
}
