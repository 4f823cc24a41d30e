//! Membership row model.
//!
//! These types describe one deployment's view of its cluster: which silos
//! exist, what state each one is in, and the version tokens that guard
//! every conditional write against them.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AddressParseError;

// ── Version token ─────────────────────────────────────────────────

/// Opaque version token attached to every stored row.
///
/// A fresh token is generated on every successful write. Callers must hand
/// back the token they read, unmodified, on their next conditional write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Generate a new random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ETag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ETag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Silo address ──────────────────────────────────────────────────

/// Network identity of one silo process: its endpoint plus a generation
/// number that distinguishes restarts on the same endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiloAddress {
    pub endpoint: SocketAddr,
    pub generation: i32,
}

impl SiloAddress {
    pub fn new(endpoint: SocketAddr, generation: i32) -> Self {
        Self {
            endpoint,
            generation,
        }
    }

    /// The endpoint IP with IPv4-mapped IPv6 addresses collapsed to IPv4.
    pub fn normalized_ip(&self) -> IpAddr {
        normalize_ip(self.endpoint.ip())
    }

    /// The endpoint with its IP normalized.
    pub fn normalized_endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.normalized_ip(), self.endpoint.port())
    }

    /// Render as `ip:port@generation` (IPv6 bracketed).
    pub fn to_parsable_string(&self) -> String {
        format!("{}@{}", self.normalized_endpoint(), self.generation)
    }

    /// Render as a gateway URI, `gwy.tcp://ip:port/generation`.
    pub fn to_gateway_uri(&self) -> String {
        format!("gwy.tcp://{}/{}", self.normalized_endpoint(), self.generation)
    }
}

impl fmt::Display for SiloAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_parsable_string())
    }
}

impl FromStr for SiloAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (endpoint, generation) = s
            .rsplit_once('@')
            .ok_or_else(|| AddressParseError::MissingGeneration(s.to_string()))?;
        let endpoint: SocketAddr = endpoint
            .parse()
            .map_err(|_| AddressParseError::Endpoint(s.to_string()))?;
        let generation: i32 = generation
            .parse()
            .map_err(|_| AddressParseError::Generation(s.to_string()))?;
        Ok(Self::new(endpoint, generation))
    }
}

/// Collapse an IPv4-mapped IPv6 address (`::ffff:a.b.c.d`) to plain IPv4.
/// Every other address is returned unchanged.
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

// ── Silo status ───────────────────────────────────────────────────

/// Lifecycle status of a silo as recorded in the membership table.
///
/// The integer codes are part of the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiloStatus {
    None,
    Created,
    Joining,
    Active,
    ShuttingDown,
    Stopping,
    Dead,
}

impl SiloStatus {
    pub fn code(self) -> i32 {
        match self {
            SiloStatus::None => 0,
            SiloStatus::Created => 1,
            SiloStatus::Joining => 2,
            SiloStatus::Active => 3,
            SiloStatus::ShuttingDown => 4,
            SiloStatus::Stopping => 5,
            SiloStatus::Dead => 6,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => SiloStatus::None,
            1 => SiloStatus::Created,
            2 => SiloStatus::Joining,
            3 => SiloStatus::Active,
            4 => SiloStatus::ShuttingDown,
            5 => SiloStatus::Stopping,
            6 => SiloStatus::Dead,
            _ => return None,
        })
    }

    /// True once the silo has started leaving the cluster.
    pub fn is_terminating(self) -> bool {
        matches!(
            self,
            SiloStatus::ShuttingDown | SiloStatus::Stopping | SiloStatus::Dead
        )
    }
}

// ── Membership rows ───────────────────────────────────────────────

/// One observer's suspicion that a silo is dead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspectTime {
    pub observer: SiloAddress,
    pub at: DateTime<Utc>,
}

/// A single silo's row in a deployment's membership table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEntry {
    pub silo_address: SiloAddress,
    pub status: SiloStatus,
    /// Ordered list of silos that currently suspect this one.
    pub suspect_times: Vec<SuspectTime>,
    /// Gateway port for external clients; 0 when the silo is not a gateway.
    pub proxy_port: u16,
    pub host_name: String,
    pub silo_name: String,
    pub role_name: String,
    pub update_zone: i32,
    pub fault_zone: i32,
    pub start_time: DateTime<Utc>,
    /// Last "I am alive" heartbeat written by the silo itself.
    pub i_am_alive_time: DateTime<Utc>,
}

impl MembershipEntry {
    /// A freshly created row for a silo that is about to join.
    pub fn new(silo_address: SiloAddress, start_time: DateTime<Utc>) -> Self {
        Self {
            silo_address,
            status: SiloStatus::Created,
            suspect_times: Vec::new(),
            proxy_port: 0,
            host_name: String::new(),
            silo_name: String::new(),
            role_name: String::new(),
            update_zone: 0,
            fault_zone: 0,
            start_time,
            i_am_alive_time: start_time,
        }
    }

    /// Whether this row advertises a reachable gateway.
    pub fn is_gateway(&self) -> bool {
        self.status == SiloStatus::Active && self.proxy_port > 0
    }

    /// Append a suspicion raised by `observer`.
    pub fn add_suspector(&mut self, observer: SiloAddress, at: DateTime<Utc>) {
        self.suspect_times.push(SuspectTime { observer, at });
    }
}

/// Version of a deployment's membership view.
///
/// No global counter is maintained: reads always report
/// [`TableVersion::current`], and row etags are the only concurrency guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableVersion {
    pub version: i32,
    pub version_etag: String,
}

impl TableVersion {
    /// The static version surfaced by every membership read.
    pub fn current() -> Self {
        Self {
            version: 0,
            version_etag: "0".to_string(),
        }
    }
}

impl Default for TableVersion {
    fn default() -> Self {
        Self::current()
    }
}

/// Result of a membership read: rows with their tokens plus the table version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipTableData {
    pub members: Vec<(MembershipEntry, ETag)>,
    pub version: TableVersion,
}

impl MembershipTableData {
    pub fn new(members: Vec<(MembershipEntry, ETag)>) -> Self {
        Self {
            members,
            version: TableVersion::current(),
        }
    }

    /// Look up a row by silo address.
    pub fn get(&self, address: &SiloAddress) -> Option<&(MembershipEntry, ETag)> {
        self.members
            .iter()
            .find(|(entry, _)| entry.silo_address == *address)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
