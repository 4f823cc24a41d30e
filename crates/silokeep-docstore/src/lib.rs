//! silokeep-docstore — document store client for silokeep.
//!
//! Defines the narrow contract the cluster table engines need from a
//! document database and two backends that honor it.
//!
//! # Architecture
//!
//! Documents are JSON objects (`serde_json::Map`) keyed by a unique string
//! `_id`. The [`DocumentStore`] trait exposes only single-document atomic
//! primitives: conditional replace, find-and-delete, unconditional field
//! update, bulk delete, filtered query, and index creation. Conditional
//! writes report a typed [`WriteOutcome`] instead of failing, so a lost
//! race is never confused with an infrastructure error.
//!
//! - [`MemoryStore`] keeps collections in process, for tests and embedding.
//! - [`RedbStore`] persists collections as redb tables, one JSON value per
//!   `_id`. Each primitive runs in its own write transaction, which gives the
//!   per-document atomicity the engines rely on and nothing more.
//!
//! Both are `Clone + Send + Sync` and are meant to be shared behind an
//! `Arc<dyn DocumentStore>` injected into the engines.

pub mod document;
pub mod error;
pub mod filter;
pub mod index;
pub mod memory;
pub mod redb_store;
pub mod store;
pub mod tables;

pub use document::{Document, ID_FIELD};
pub use error::{StoreError, StoreResult};
pub use filter::Filter;
pub use index::{IndexKey, IndexModel, IndexOrder};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use store::{DocumentStore, WriteOutcome};
