//! Shared compare-and-set helpers.
//!
//! The store offers no native concurrency tokens, so each row carries an
//! `Etag` field. A conditional write filters on the row identity plus the
//! etag the caller last read and writes a document carrying a new etag.
//! Whoever commits first invalidates every other holder of the old token.

use silokeep_core::ETag;
use silokeep_docstore::{Filter, WriteOutcome};
use tracing::{debug, warn};

use crate::mapping::ETAG;

/// Narrow a row filter to the version the caller holds.
pub fn version_filter(row: Filter, expected: &ETag) -> Filter {
    row.and(Filter::eq(ETAG, expected.as_str()))
}

/// Fold a store write outcome into the engines' boolean contract.
///
/// `NotMatched` (stale etag or missing row) and `DuplicateKey` (a
/// concurrent insert won) both mean the caller lost the race and must
/// re-read before trying again.
pub fn applied(outcome: WriteOutcome, collection: &str, id: &str) -> bool {
    match outcome {
        WriteOutcome::Applied => {
            debug!(%collection, %id, "conditional write applied");
            true
        }
        WriteOutcome::NotMatched => {
            debug!(%collection, %id, "conditional write rejected: version mismatch");
            false
        }
        WriteOutcome::DuplicateKey => {
            warn!(%collection, %id, "conditional write rejected: row already exists");
            false
        }
    }
}
