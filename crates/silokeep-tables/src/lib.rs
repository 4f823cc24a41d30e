//! silokeep-tables — cluster membership and reminder tables.
//!
//! Storage engines for an actor runtime's coordination state, built on a
//! document store that only guarantees single-document atomicity.
//!
//! # Architecture
//!
//! ```text
//! MembershipTable / ReminderTable      (engines: CAS protocol, queries)
//!   ├── mapping                         (row ⇄ document, collection layout)
//!   ├── cas                             (etag filters, outcome folding)
//!   └── bootstrap                       (idempotent index creation)
//!         │
//!         ▼
//! Arc<dyn DocumentStore>                (injected by the caller, or
//!                                       built by `open_store` from config)
//! ```
//!
//! Every conditional write is filtered on the row's current etag and
//! replaces it with a freshly generated one. A lost race comes back as
//! `false` (or [`ReminderUpsert::DuplicateKey`]); only infrastructure
//! failures are errors. The engines never retry on their own.

pub mod backend;
pub mod bootstrap;
pub mod cas;
pub mod error;
pub mod mapping;
pub mod membership;
pub mod reminders;

pub use backend::open_store;
pub use error::{TableError, TableResult};
pub use membership::MembershipTable;
pub use reminders::{ReminderTable, ReminderUpsert};
