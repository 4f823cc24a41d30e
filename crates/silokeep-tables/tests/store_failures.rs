//! Failure propagation tests.
//!
//! Infrastructure faults must surface as errors the caller can classify,
//! while lost races stay plain `false`. An abandoned operation must leave
//! nothing half-written.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use silokeep_core::*;
use silokeep_docstore::{
    Document, DocumentStore, Filter, IndexModel, MemoryStore, StoreError, StoreResult, WriteOutcome,
};
use silokeep_tables::{MembershipTable, ReminderTable, TableError};

/// Wraps a [`MemoryStore`], failing every call while `down` is set and
/// stalling writes while `stall_writes` is set.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
    stall_writes: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    async fn before_write(&self) -> StoreResult<()> {
        self.check()?;
        if self.stall_writes.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<WriteOutcome> {
        self.before_write().await?;
        self.inner.insert_one(collection, doc).await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        doc: Document,
        upsert: bool,
    ) -> StoreResult<WriteOutcome> {
        self.before_write().await?;
        self.inner.replace_one(collection, filter, doc, upsert).await
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        self.before_write().await?;
        self.inner.delete_one(collection, filter).await
    }

    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> StoreResult<u64> {
        self.before_write().await?;
        self.inner.update_one(collection, filter, set).await
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.before_write().await?;
        self.inner.delete_many(collection, filter).await
    }

    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.check()?;
        self.inner.find(collection, filter).await
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> StoreResult<()> {
        self.check()?;
        self.inner.create_index(collection, index).await
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>> {
        self.check()?;
        self.inner.list_indexes(collection).await
    }
}

fn at(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap()
}

fn entry() -> MembershipEntry {
    MembershipEntry::new("10.0.0.1:11111@1".parse().unwrap(), at(1_000))
}

#[tokio::test]
async fn outage_is_a_retryable_error() {
    let store = Arc::new(FlakyStore::default());
    let table = MembershipTable::new(store.clone(), &StoreConfig::default());
    store.down.store(true, Ordering::SeqCst);

    let err = table
        .insert_row("prod", &entry(), &TableVersion::current())
        .await
        .unwrap_err();
    assert!(matches!(err, TableError::Store(StoreError::Unavailable(_))));
    assert!(err.is_retryable());

    let err = table.read_all("prod").await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn lost_race_is_not_an_error() {
    let store = Arc::new(FlakyStore::default());
    let table = MembershipTable::new(store, &StoreConfig::default());
    let version = TableVersion::current();

    assert!(table.insert_row("prod", &entry(), &version).await.unwrap());
    assert!(!table.insert_row("prod", &entry(), &version).await.unwrap());
    assert!(
        !table
            .update_row("prod", &entry(), &ETag::from("stale"), &version)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn bootstrap_failure_propagates() {
    let store = Arc::new(FlakyStore::default());
    store.down.store(true, Ordering::SeqCst);
    let table = ReminderTable::new(store, &StoreConfig::default());
    assert!(table.init().await.unwrap_err().is_retryable());
}

#[tokio::test]
async fn abandoned_write_leaves_no_row() {
    let store = Arc::new(FlakyStore::default());
    let table = MembershipTable::new(store.clone(), &StoreConfig::default());
    store.stall_writes.store(true, Ordering::SeqCst);

    let attempt = tokio::time::timeout(
        Duration::from_millis(50),
        table.insert_row("prod", &entry(), &TableVersion::current()),
    )
    .await;
    assert!(attempt.is_err());

    store.stall_writes.store(false, Ordering::SeqCst);
    assert!(table.read_all("prod").await.unwrap().is_empty());
    assert!(
        table
            .insert_row("prod", &entry(), &TableVersion::current())
            .await
            .unwrap()
    );
}
