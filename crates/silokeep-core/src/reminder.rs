//! Reminder row model and ring addressing.
//!
//! Reminders are owned by grains. Each grain maps to a stable position on a
//! `u32` hash ring; silos own contiguous ring ranges and load the reminders
//! whose grain hash falls in their range.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::ETag;

/// Identity of a grain, rendered as `type/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrainId(String);

impl GrainId {
    pub fn new(grain_type: &str, key: &str) -> Self {
        Self(format!("{grain_type}/{key}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable position of this grain on the reminder ring.
    ///
    /// The first four bytes of SHA-256 over the string form, big-endian.
    pub fn uniform_hash(&self) -> u32 {
        let digest = Sha256::digest(self.0.as_bytes());
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}

impl From<String> for GrainId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for GrainId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for GrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A contiguous slice of the `u32` hash ring, `(begin, end]`.
///
/// When `begin > end` the range wraps through zero. When `begin == end` the
/// range covers the whole ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RingRange {
    pub begin: u32,
    pub end: u32,
}

impl RingRange {
    pub fn new(begin: u32, end: u32) -> Self {
        Self { begin, end }
    }

    pub fn full() -> Self {
        Self { begin: 0, end: 0 }
    }

    pub fn is_full(&self) -> bool {
        self.begin == self.end
    }

    pub fn wraps(&self) -> bool {
        self.begin > self.end
    }

    pub fn contains(&self, position: u32) -> bool {
        if self.is_full() {
            true
        } else if self.wraps() {
            position > self.begin || position <= self.end
        } else {
            position > self.begin && position <= self.end
        }
    }
}

/// A durable, recurring wake-up registered by a grain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderEntry {
    pub grain_id: GrainId,
    pub reminder_name: String,
    pub start_at: DateTime<Utc>,
    pub period: Duration,
    /// Token of the stored row; `None` until the row has been written.
    pub etag: Option<ETag>,
}

impl ReminderEntry {
    pub fn new(
        grain_id: GrainId,
        reminder_name: &str,
        start_at: DateTime<Utc>,
        period: Duration,
    ) -> Self {
        Self {
            grain_id,
            reminder_name: reminder_name.to_string(),
            start_at,
            period,
            etag: None,
        }
    }

    /// Ring position of the owning grain.
    pub fn grain_hash(&self) -> u32 {
        self.grain_id.uniform_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_range_is_left_open_right_closed() {
        let range = RingRange::new(100, 200);
        assert!(!range.contains(100));
        assert!(range.contains(101));
        assert!(range.contains(200));
        assert!(!range.contains(201));
    }

    #[test]
    fn wrapping_range_crosses_zero() {
        let range = RingRange::new(350, 10);
        assert!(range.wraps());
        assert!(range.contains(355));
        assert!(range.contains(5));
        assert!(range.contains(0));
        assert!(range.contains(u32::MAX));
        assert!(!range.contains(200));
        assert!(!range.contains(350));
    }

    #[test]
    fn equal_bounds_cover_everything() {
        let range = RingRange::new(7, 7);
        assert!(range.is_full());
        assert!(range.contains(7));
        assert!(range.contains(0));
        assert!(RingRange::full().contains(u32::MAX));
    }

    #[test]
    fn grain_hash_is_stable() {
        let grain = GrainId::new("counter", "42");
        assert_eq!(grain.as_str(), "counter/42");
        assert_eq!(grain.uniform_hash(), GrainId::from("counter/42").uniform_hash());
        assert_ne!(grain.uniform_hash(), GrainId::new("counter", "43").uniform_hash());
    }
}
