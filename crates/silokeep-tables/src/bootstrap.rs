//! Collection bootstrapping.
//!
//! Creates the secondary indexes each table queries by. Safe to run from
//! several processes at once: two silos starting together may race to
//! create the same index, and an equivalent index may already exist under
//! a name chosen by an older writer.

use silokeep_core::MembershipLayout;
use silokeep_docstore::{DocumentStore, IndexModel, StoreError};
use tracing::{debug, info};

use crate::error::TableResult;
use crate::mapping::{DEPLOYMENT_ID, GRAIN_HASH, GRAIN_ID, SERVICE_ID};

/// Indexes the membership collection needs under a given layout.
pub fn membership_indexes(layout: MembershipLayout) -> Vec<IndexModel> {
    match layout {
        // Rows are only ever looked up by `_id` or scanned whole.
        MembershipLayout::PerDeployment => Vec::new(),
        MembershipLayout::Shared => vec![
            IndexModel::new()
                .named("membership_by_deployment")
                .ascending(DEPLOYMENT_ID),
        ],
    }
}

/// Indexes the reminder collection needs.
pub fn reminder_indexes() -> Vec<IndexModel> {
    vec![
        IndexModel::new()
            .named("reminders_by_hash")
            .ascending(SERVICE_ID)
            .ascending(GRAIN_HASH),
        IndexModel::new()
            .named("reminders_by_grain")
            .ascending(SERVICE_ID)
            .ascending(GRAIN_ID),
    ]
}

/// Make sure every index in `indexes` exists on `collection`.
///
/// Idempotent. Any failure other than the tolerated name race is returned.
pub async fn ensure_indexes(
    store: &dyn DocumentStore,
    collection: &str,
    indexes: &[IndexModel],
) -> TableResult<()> {
    for index in indexes {
        ensure_index(store, collection, index).await?;
    }
    info!(%collection, count = indexes.len(), "collection indexes ensured");
    Ok(())
}

async fn ensure_index(store: &dyn DocumentStore, collection: &str, index: &IndexModel) -> TableResult<()> {
    match store.create_index(collection, index.clone()).await {
        Ok(()) => Ok(()),
        Err(StoreError::IndexOptionsConflict { existing, .. }) => {
            debug!(
                %collection,
                requested = %index.effective_name(),
                %existing,
                "equivalent index exists under another name, retrying unnamed"
            );
            match store.create_index(collection, index.unnamed()).await {
                Ok(()) | Err(StoreError::IndexOptionsConflict { .. }) => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TableError;
    use silokeep_docstore::MemoryStore;

    #[tokio::test]
    async fn creates_indexes_once() {
        let store = MemoryStore::new();
        let indexes = reminder_indexes();
        ensure_indexes(&store, "Reminders", &indexes).await.unwrap();
        ensure_indexes(&store, "Reminders", &indexes).await.unwrap();

        let created = store.list_indexes("Reminders").await.unwrap();
        assert_eq!(created.len(), 2);
    }

    #[tokio::test]
    async fn tolerates_equivalent_index_under_other_name() {
        let store = MemoryStore::new();
        store
            .create_index(
                "Membership",
                IndexModel::new().named("legacy_deployment").ascending(DEPLOYMENT_ID),
            )
            .await
            .unwrap();

        ensure_indexes(&store, "Membership", &membership_indexes(MembershipLayout::Shared))
            .await
            .unwrap();

        let created = store.list_indexes("Membership").await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].effective_name(), "legacy_deployment");
    }

    #[tokio::test]
    async fn tolerates_existing_unnamed_equivalent() {
        let store = MemoryStore::new();
        store
            .create_index("Membership", IndexModel::new().ascending(DEPLOYMENT_ID))
            .await
            .unwrap();

        ensure_indexes(&store, "Membership", &membership_indexes(MembershipLayout::Shared))
            .await
            .unwrap();
        assert_eq!(store.list_indexes("Membership").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn name_conflict_is_fatal() {
        let store = MemoryStore::new();
        store
            .create_index(
                "Membership",
                IndexModel::new().named("membership_by_deployment").ascending("Other"),
            )
            .await
            .unwrap();

        let err = ensure_indexes(&store, "Membership", &membership_indexes(MembershipLayout::Shared))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TableError::Store(StoreError::IndexNameConflict { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_bootstraps_converge() {
        let store = MemoryStore::new();
        let indexes = reminder_indexes();
        let (a, b) = tokio::join!(
            ensure_indexes(&store, "Reminders", &indexes),
            ensure_indexes(&store, "Reminders", &indexes),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(store.list_indexes("Reminders").await.unwrap().len(), 2);
    }

    #[test]
    fn per_deployment_layout_needs_no_secondary_index() {
        assert!(membership_indexes(MembershipLayout::PerDeployment).is_empty());
    }
}
