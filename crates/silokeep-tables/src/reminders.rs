//! Reminder table — durable recurring wake-ups keyed by grain and name.
//!
//! Rows are scoped to one service id and carry the owning grain's ring
//! position so a silo can load exactly the reminders whose grains fall in
//! the ring range it owns.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use silokeep_core::*;
use silokeep_docstore::{DocumentStore, Filter, ID_FIELD};

use crate::bootstrap::{ensure_indexes, reminder_indexes};
use crate::cas;
use crate::error::TableResult;
use crate::mapping::{self, GRAIN_HASH, GRAIN_ID, REMINDER_NAME, SERVICE_ID};

/// Result of a reminder write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderUpsert {
    /// The row was stored; carries the fresh etag.
    Written(ReminderEntry),
    /// Another writer owns the key: it already existed for an insert, or
    /// its etag moved on for an update.
    DuplicateKey,
}

impl ReminderUpsert {
    pub fn into_written(self) -> Option<ReminderEntry> {
        match self {
            ReminderUpsert::Written(entry) => Some(entry),
            ReminderUpsert::DuplicateKey => None,
        }
    }
}

/// Storage engine for grain reminders.
#[derive(Clone)]
pub struct ReminderTable {
    store: Arc<dyn DocumentStore>,
    service_id: String,
    collection: String,
}

impl ReminderTable {
    pub fn new(store: Arc<dyn DocumentStore>, config: &StoreConfig) -> Self {
        Self {
            store,
            service_id: config.service_id.clone(),
            collection: mapping::reminder_collection(&config.collection_prefix),
        }
    }

    pub async fn init(&self) -> TableResult<()> {
        ensure_indexes(self.store.as_ref(), &self.collection, &reminder_indexes()).await?;
        info!(service_id = %self.service_id, collection = %self.collection, "reminder table initialized");
        Ok(())
    }

    fn service_filter(&self) -> Filter {
        Filter::eq(SERVICE_ID, self.service_id.as_str())
    }

    fn key_filter(&self, grain_id: &GrainId, reminder_name: &str) -> Filter {
        Filter::id(&mapping::reminder_id(&self.service_id, grain_id, reminder_name))
            .and(self.service_filter())
            .and(Filter::eq(GRAIN_ID, grain_id.as_str()))
            .and(Filter::eq(REMINDER_NAME, reminder_name))
    }

    /// Store a reminder under compare-and-set.
    ///
    /// With `expected = None` the key must not exist yet; with `Some(etag)`
    /// the stored row must still carry that etag.
    pub async fn upsert_reminder(
        &self,
        entry: &ReminderEntry,
        expected: Option<&ETag>,
    ) -> TableResult<ReminderUpsert> {
        let id = mapping::reminder_id(&self.service_id, &entry.grain_id, &entry.reminder_name);
        let etag = ETag::generate();
        let doc = mapping::reminder_to_document(&self.service_id, entry, &etag)?;

        let outcome = match expected {
            None => self.store.insert_one(&self.collection, doc).await?,
            Some(expected) => {
                let filter =
                    cas::version_filter(self.key_filter(&entry.grain_id, &entry.reminder_name), expected);
                self.store.replace_one(&self.collection, &filter, doc, false).await?
            }
        };

        if !cas::applied(outcome, &self.collection, &id) {
            return Ok(ReminderUpsert::DuplicateKey);
        }
        let mut written = entry.clone();
        written.etag = Some(etag);
        Ok(ReminderUpsert::Written(written))
    }

    pub async fn read_reminder(
        &self,
        grain_id: &GrainId,
        reminder_name: &str,
    ) -> TableResult<Option<ReminderEntry>> {
        let docs = self
            .store
            .find(&self.collection, &self.key_filter(grain_id, reminder_name))
            .await?;
        docs.into_iter()
            .next()
            .map(mapping::reminder_from_document)
            .transpose()
    }

    /// Every reminder registered by one grain.
    pub async fn read_grain_reminders(&self, grain_id: &GrainId) -> TableResult<Vec<ReminderEntry>> {
        let filter = self
            .service_filter()
            .and(Filter::eq(GRAIN_ID, grain_id.as_str()));
        let docs = self.store.find(&self.collection, &filter).await?;
        docs.into_iter().map(mapping::reminder_from_document).collect()
    }

    /// Reminders whose grain hash falls in `(begin, end]` on the ring.
    ///
    /// A wrapping range is one query over the union of its two sub-ranges.
    /// Each row appears once; results carry no ordering guarantee.
    pub async fn read_range(&self, begin: u32, end: u32) -> TableResult<Vec<ReminderEntry>> {
        let range = RingRange::new(begin, end);
        let upper = Filter::gt(GRAIN_HASH, begin);
        let lower = Filter::lte(GRAIN_HASH, end);
        let condition = if range.is_full() {
            Filter::All
        } else if range.wraps() {
            upper.or(lower)
        } else {
            upper.and(lower)
        };

        let filter = self.service_filter().and(condition);
        let mut merged = BTreeMap::new();
        for doc in self.store.find(&self.collection, &filter).await? {
            let id = doc
                .get(ID_FIELD)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            merged.entry(id).or_insert(doc);
        }

        let rows = merged
            .into_values()
            .map(mapping::reminder_from_document)
            .collect::<TableResult<Vec<_>>>()?;
        debug!(begin, end, count = rows.len(), "reminder range read");
        Ok(rows)
    }

    /// Delete a reminder held at `expected`. Returns `false` when the row
    /// is gone or its etag has moved on.
    pub async fn delete_reminder(
        &self,
        grain_id: &GrainId,
        reminder_name: &str,
        expected: &ETag,
    ) -> TableResult<bool> {
        let filter = cas::version_filter(self.key_filter(grain_id, reminder_name), expected);
        let removed = self.store.delete_one(&self.collection, &filter).await?;
        debug!(%grain_id, %reminder_name, removed = removed.is_some(), "reminder delete");
        Ok(removed.is_some())
    }

    /// Remove every reminder of this service.
    pub async fn delete_all(&self) -> TableResult<u64> {
        let removed = self
            .store
            .delete_many(&self.collection, &self.service_filter())
            .await?;
        info!(service_id = %self.service_id, removed, "reminder table cleared");
        Ok(removed)
    }
}
