//! redb table definitions for the persistent document store.
//!
//! Every collection is its own table with `&str` keys (the document `_id`)
//! and `&[u8]` values (the JSON-encoded document). Secondary index
//! definitions live in a catalog table keyed by collection name.

use redb::TableDefinition;

/// Index catalog: collection name → JSON-encoded `Vec<IndexModel>`.
pub const INDEX_CATALOG: TableDefinition<&str, &[u8]> = TableDefinition::new("__silokeep_indexes");

/// Prefix that keeps collection tables apart from internal ones.
const COLLECTION_TABLE_PREFIX: &str = "coll:";

/// Name of the redb table that stores a collection.
pub fn collection_table_name(collection: &str) -> String {
    format!("{COLLECTION_TABLE_PREFIX}{collection}")
}

/// Table definition for a collection, borrowing its table name.
pub fn collection_table(table_name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(table_name)
}
