//! Membership table — versioned storage of cluster silo rows.
//!
//! Stores one row per silo per deployment. Rows change only through
//! compare-and-set on their etag; the table version reported to callers
//! is static and informational (see [`TableVersion::current`]).

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use silokeep_core::*;
use silokeep_docstore::{Document, DocumentStore, Filter};

use crate::bootstrap::{ensure_indexes, membership_indexes};
use crate::cas;
use crate::error::TableResult;
use crate::mapping::{self, MembershipCollection, I_AM_ALIVE_TIME, PROXY_PORT, STATUS, TIMESTAMP};

/// Storage engine for cluster membership rows.
///
/// Stateless over the injected store handle; cheap to clone and safe to
/// share across tasks.
#[derive(Clone)]
pub struct MembershipTable {
    store: Arc<dyn DocumentStore>,
    layout: MembershipLayout,
    collection_prefix: String,
}

impl MembershipTable {
    /// Create a membership table over `store`, laid out per `config`.
    pub fn new(store: Arc<dyn DocumentStore>, config: &StoreConfig) -> Self {
        Self {
            store,
            layout: config.membership_layout,
            collection_prefix: config.collection_prefix.clone(),
        }
    }

    fn collection(&self, deployment_id: &str) -> MembershipCollection {
        MembershipCollection::new(self.layout, &self.collection_prefix, deployment_id)
    }

    /// Prepare the deployment's collection and indexes.
    pub async fn init(&self, deployment_id: &str) -> TableResult<()> {
        let collection = self.collection(deployment_id);
        ensure_indexes(self.store.as_ref(), &collection.name, &membership_indexes(self.layout)).await?;
        info!(%deployment_id, collection = %collection.name, "membership table initialized");
        Ok(())
    }

    /// Write a row under compare-and-set.
    ///
    /// With `expected = None` the row must not exist yet. With
    /// `Some(etag)` the stored row must still carry that etag. Returns
    /// `false` when the condition fails; the caller must re-read before
    /// trying again.
    pub async fn upsert_row(
        &self,
        deployment_id: &str,
        entry: &MembershipEntry,
        expected: Option<&ETag>,
    ) -> TableResult<bool> {
        let collection = self.collection(deployment_id);
        let id = mapping::membership_id(deployment_id, &entry.silo_address);
        let etag = ETag::generate();
        let doc = mapping::membership_to_document(deployment_id, entry, &etag, Utc::now())?;

        let outcome = match expected {
            None => self.store.insert_one(&collection.name, doc).await?,
            Some(expected) => {
                let filter = cas::version_filter(collection.row_filter(&entry.silo_address), expected);
                self.store
                    .replace_one(&collection.name, &filter, doc, false)
                    .await?
            }
        };
        Ok(cas::applied(outcome, &collection.name, &id))
    }

    /// Insert a new row. The table version is accepted and ignored.
    pub async fn insert_row(
        &self,
        deployment_id: &str,
        entry: &MembershipEntry,
        _version: &TableVersion,
    ) -> TableResult<bool> {
        self.upsert_row(deployment_id, entry, None).await
    }

    /// Update an existing row held at `etag`. The table version is accepted
    /// and ignored.
    pub async fn update_row(
        &self,
        deployment_id: &str,
        entry: &MembershipEntry,
        etag: &ETag,
        _version: &TableVersion,
    ) -> TableResult<bool> {
        self.upsert_row(deployment_id, entry, Some(etag)).await
    }

    /// Read one silo's row. Absent rows yield empty `members`.
    pub async fn read_row(
        &self,
        deployment_id: &str,
        address: &SiloAddress,
    ) -> TableResult<MembershipTableData> {
        let collection = self.collection(deployment_id);
        let docs = self
            .store
            .find(&collection.name, &collection.row_filter(address))
            .await?;
        let members = decode_rows(docs)?;
        debug!(%deployment_id, %address, found = !members.is_empty(), "membership row read");
        Ok(MembershipTableData::new(members))
    }

    /// Read every row of the deployment.
    pub async fn read_all(&self, deployment_id: &str) -> TableResult<MembershipTableData> {
        let collection = self.collection(deployment_id);
        let docs = self
            .store
            .find(&collection.name, &collection.deployment_filter())
            .await?;
        let members = decode_rows(docs)?;
        debug!(%deployment_id, count = members.len(), "membership table read");
        Ok(MembershipTableData::new(members))
    }

    /// Addresses of every active silo that accepts client connections,
    /// sorted and without duplicates.
    pub async fn list_gateways(&self, deployment_id: &str) -> TableResult<Vec<SiloAddress>> {
        let collection = self.collection(deployment_id);
        let filter = collection
            .deployment_filter()
            .and(Filter::eq(STATUS, SiloStatus::Active.code()))
            .and(Filter::gt(PROXY_PORT, 0));
        let docs = self.store.find(&collection.name, &filter).await?;

        let mut gateways = BTreeSet::new();
        for doc in docs {
            let (entry, _) = mapping::membership_from_document(doc)?;
            if entry.is_gateway() {
                gateways.insert(mapping::gateway_address(&entry));
            }
        }
        debug!(%deployment_id, count = gateways.len(), "gateways listed");
        Ok(gateways.into_iter().collect())
    }

    /// Gateway list rendered as `gwy.tcp://ip:port/generation` URIs.
    pub async fn list_gateway_uris(&self, deployment_id: &str) -> TableResult<Vec<String>> {
        Ok(self
            .list_gateways(deployment_id)
            .await?
            .iter()
            .map(SiloAddress::to_gateway_uri)
            .collect())
    }

    /// Record a silo's heartbeat.
    ///
    /// Unconditional: only the silo itself writes its heartbeat, so the
    /// last write wins. The row's etag is left untouched. A missing row is
    /// ignored.
    pub async fn update_i_am_alive(
        &self,
        deployment_id: &str,
        address: &SiloAddress,
        at: DateTime<Utc>,
    ) -> TableResult<()> {
        let collection = self.collection(deployment_id);
        let id = mapping::membership_id(deployment_id, address);
        let mut set = Document::new();
        set.insert(I_AM_ALIVE_TIME.to_string(), mapping::stored_time(&id, at)?.into());
        set.insert(TIMESTAMP.to_string(), mapping::stored_time(&id, Utc::now())?.into());

        let modified = self
            .store
            .update_one(&collection.name, &collection.row_filter(address), set)
            .await?;
        if modified == 0 {
            debug!(%deployment_id, %address, "heartbeat for unknown silo ignored");
        }
        Ok(())
    }

    /// Remove rows of dead silos whose last heartbeat is before `cutoff`.
    /// Returns the number of rows removed.
    pub async fn delete_defunct_rows(
        &self,
        deployment_id: &str,
        cutoff: DateTime<Utc>,
    ) -> TableResult<u64> {
        let collection = self.collection(deployment_id);
        let filter = collection
            .deployment_filter()
            .and(Filter::eq(STATUS, SiloStatus::Dead.code()))
            .and(Filter::lt(I_AM_ALIVE_TIME, mapping::stored_bound(cutoff)));
        let removed = self.store.delete_many(&collection.name, &filter).await?;
        info!(%deployment_id, %cutoff, removed, "defunct membership rows deleted");
        Ok(removed)
    }

    /// Remove defunct rows older than the configured retention window.
    pub async fn prune_defunct(&self, deployment_id: &str, config: &StoreConfig) -> TableResult<u64> {
        let cutoff = chrono::Duration::from_std(config.defunct_retention())
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.delete_defunct_rows(deployment_id, cutoff).await
    }

    /// Remove every row of the deployment.
    pub async fn delete_all(&self, deployment_id: &str) -> TableResult<u64> {
        let collection = self.collection(deployment_id);
        let removed = self
            .store
            .delete_many(&collection.name, &collection.deployment_filter())
            .await?;
        info!(%deployment_id, removed, "membership table cleared");
        Ok(removed)
    }
}

fn decode_rows(docs: Vec<Document>) -> TableResult<Vec<(MembershipEntry, ETag)>> {
    docs.into_iter()
        .map(mapping::membership_from_document)
        .collect()
}
