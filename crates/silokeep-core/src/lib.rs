//! silokeep-core — shared row model for the silokeep cluster tables.
//!
//! Holds the logical rows the membership and reminder engines store
//! (`MembershipEntry`, `ReminderEntry`), the addressing types they are
//! keyed by (`SiloAddress`, `GrainId`, `RingRange`), the opaque `ETag`
//! version token, and the TOML-backed `StoreConfig`.

pub mod config;
pub mod error;
pub mod reminder;
pub mod types;

pub use config::{MembershipLayout, StoreConfig};
pub use error::{AddressParseError, ConfigError};
pub use reminder::*;
pub use types::*;
