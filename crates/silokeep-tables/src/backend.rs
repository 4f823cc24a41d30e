//! Store selection from configuration.

use std::sync::Arc;

use silokeep_core::StoreConfig;
use silokeep_docstore::{DocumentStore, MemoryStore, RedbStore};
use tracing::info;

use crate::error::TableResult;

/// Open the document store `config` describes: the redb file at
/// `database_path` when one is set, otherwise a fresh in-memory store.
///
/// Each call opens a new handle. Share the returned `Arc` between the
/// membership and reminder tables rather than opening the same file twice.
pub fn open_store(config: &StoreConfig) -> TableResult<Arc<dyn DocumentStore>> {
    match &config.database_path {
        Some(path) => {
            let store = RedbStore::open(path)?;
            info!(path = ?path, "redb document store opened");
            Ok(Arc::new(store))
        }
        None => {
            info!("no database path configured, using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
