//! Row ⇄ document mapping and collection layout.
//!
//! This is the only module that knows document field names, identity
//! string formats, and which membership layout is in use. Field names and
//! identity formats are an on-disk contract shared with older writers.
//!
//! Timestamps are stored as Unix nanoseconds and reminder periods as
//! nanoseconds, so a row reads back exactly as it was written. Instants
//! outside the i64 nanosecond range (years 1677 to 2262) are rejected.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use silokeep_core::*;
use silokeep_docstore::{Document, Filter};

use crate::error::{TableError, TableResult};

pub const DEPLOYMENT_ID: &str = "DeploymentId";
pub const STATUS: &str = "Status";
pub const PROXY_PORT: &str = "ProxyPort";
pub const I_AM_ALIVE_TIME: &str = "IAmAliveTime";
pub const TIMESTAMP: &str = "Timestamp";
pub const ETAG: &str = "Etag";
pub const SERVICE_ID: &str = "ServiceId";
pub const GRAIN_ID: &str = "GrainId";
pub const REMINDER_NAME: &str = "ReminderName";
pub const GRAIN_HASH: &str = "GrainHash";

// ── Membership documents ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SuspectTimeDocument {
    pub address: String,
    pub i_am_alive_time: i64,
}

/// On-disk shape of a membership row.
///
/// Descriptive fields default when absent so rows written by older
/// writers still decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MembershipDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub deployment_id: String,
    pub address: String,
    pub port: u16,
    pub generation: i32,
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub silo_name: String,
    #[serde(default)]
    pub role_name: String,
    #[serde(default)]
    pub update_zone: i32,
    #[serde(default)]
    pub fault_zone: i32,
    pub status: i32,
    pub proxy_port: u16,
    #[serde(default)]
    pub suspect_times: Vec<SuspectTimeDocument>,
    pub start_time: i64,
    pub i_am_alive_time: i64,
    /// Time of the last write to this document.
    pub timestamp: i64,
    pub etag: String,
}

/// Where a deployment's membership rows live and how they are filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipCollection {
    pub name: String,
    layout: MembershipLayout,
    deployment_id: String,
}

impl MembershipCollection {
    pub fn new(layout: MembershipLayout, prefix: &str, deployment_id: &str) -> Self {
        let name = match layout {
            MembershipLayout::PerDeployment => format!("{prefix}Membership_{deployment_id}"),
            MembershipLayout::Shared => format!("{prefix}Membership"),
        };
        Self {
            name,
            layout,
            deployment_id: deployment_id.to_string(),
        }
    }

    /// Filter selecting every row of this deployment.
    pub fn deployment_filter(&self) -> Filter {
        match self.layout {
            MembershipLayout::PerDeployment => Filter::All,
            MembershipLayout::Shared => Filter::eq(DEPLOYMENT_ID, self.deployment_id.as_str()),
        }
    }

    /// Filter selecting exactly one silo's row.
    pub fn row_filter(&self, address: &SiloAddress) -> Filter {
        Filter::id(&membership_id(&self.deployment_id, address)).and(self.deployment_filter())
    }
}

/// Identity of a membership row: `deployment@ip:port/generation`.
pub fn membership_id(deployment_id: &str, address: &SiloAddress) -> String {
    format!(
        "{}@{}:{}/{}",
        deployment_id,
        address.normalized_ip(),
        address.endpoint.port(),
        address.generation
    )
}

pub fn membership_to_document(
    deployment_id: &str,
    entry: &MembershipEntry,
    etag: &ETag,
    written_at: DateTime<Utc>,
) -> TableResult<Document> {
    let address = &entry.silo_address;
    let id = membership_id(deployment_id, address);
    let mut suspect_times = Vec::with_capacity(entry.suspect_times.len());
    for suspect in &entry.suspect_times {
        suspect_times.push(SuspectTimeDocument {
            address: suspect.observer.to_parsable_string(),
            i_am_alive_time: stored_time(&id, suspect.at)?,
        });
    }
    let doc = MembershipDocument {
        start_time: stored_time(&id, entry.start_time)?,
        i_am_alive_time: stored_time(&id, entry.i_am_alive_time)?,
        timestamp: stored_time(&id, written_at)?,
        id,
        deployment_id: deployment_id.to_string(),
        address: address.normalized_ip().to_string(),
        port: address.endpoint.port(),
        generation: address.generation,
        host_name: entry.host_name.clone(),
        silo_name: entry.silo_name.clone(),
        role_name: entry.role_name.clone(),
        update_zone: entry.update_zone,
        fault_zone: entry.fault_zone,
        status: entry.status.code(),
        proxy_port: entry.proxy_port,
        suspect_times,
        etag: etag.to_string(),
    };
    to_document(&doc.id, &doc)
}

pub fn membership_from_document(doc: Document) -> TableResult<(MembershipEntry, ETag)> {
    let id = doc_id(&doc);
    let stored: MembershipDocument =
        serde_json::from_value(doc.into()).map_err(|e| TableError::mapping(&id, e))?;

    let ip = stored
        .address
        .parse()
        .map_err(|_| TableError::mapping(&id, format!("bad address {:?}", stored.address)))?;
    let silo_address = SiloAddress::new(std::net::SocketAddr::new(ip, stored.port), stored.generation);
    let status = SiloStatus::from_code(stored.status)
        .ok_or_else(|| TableError::mapping(&id, format!("unknown status {}", stored.status)))?;

    let mut suspect_times = Vec::with_capacity(stored.suspect_times.len());
    for suspect in &stored.suspect_times {
        let observer: SiloAddress = suspect
            .address
            .parse()
            .map_err(|e| TableError::mapping(&id, e))?;
        suspect_times.push(SuspectTime {
            observer,
            at: DateTime::from_timestamp_nanos(suspect.i_am_alive_time),
        });
    }

    let entry = MembershipEntry {
        silo_address,
        status,
        suspect_times,
        proxy_port: stored.proxy_port,
        host_name: stored.host_name,
        silo_name: stored.silo_name,
        role_name: stored.role_name,
        update_zone: stored.update_zone,
        fault_zone: stored.fault_zone,
        start_time: DateTime::from_timestamp_nanos(stored.start_time),
        i_am_alive_time: DateTime::from_timestamp_nanos(stored.i_am_alive_time),
    };
    Ok((entry, ETag::from(stored.etag)))
}

/// Gateway address advertised by a stored row: its IP (IPv4-mapped
/// addresses collapsed to IPv4) with the proxy port in place of the silo port.
pub fn gateway_address(entry: &MembershipEntry) -> SiloAddress {
    let ip = normalize_ip(entry.silo_address.endpoint.ip());
    SiloAddress::new(
        std::net::SocketAddr::new(ip, entry.proxy_port),
        entry.silo_address.generation,
    )
}

// ── Reminder documents ────────────────────────────────────────────

/// On-disk shape of a reminder row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReminderDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub service_id: String,
    pub grain_id: String,
    pub reminder_name: String,
    pub start_at: i64,
    pub period: u64,
    pub grain_hash: u32,
    pub etag: String,
}

/// Collection holding every reminder, across services.
pub fn reminder_collection(prefix: &str) -> String {
    format!("{prefix}Reminders")
}

/// Identity of a reminder row.
///
/// The service id and grain id are length-prefixed so that no two distinct
/// `(service, grain, name)` triples share an identity, whatever characters
/// the parts contain: `svc` / `counter/7` / `tick` becomes
/// `3:svc_9:counter/7_tick`.
pub fn reminder_id(service_id: &str, grain_id: &GrainId, reminder_name: &str) -> String {
    let grain_id = grain_id.as_str();
    format!(
        "{}:{service_id}_{}:{grain_id}_{reminder_name}",
        service_id.len(),
        grain_id.len()
    )
}

pub fn reminder_to_document(service_id: &str, entry: &ReminderEntry, etag: &ETag) -> TableResult<Document> {
    let id = reminder_id(service_id, &entry.grain_id, &entry.reminder_name);
    let period = u64::try_from(entry.period.as_nanos())
        .map_err(|_| TableError::mapping(&id, format!("period {:?} too long to store", entry.period)))?;
    let doc = ReminderDocument {
        start_at: stored_time(&id, entry.start_at)?,
        period,
        id,
        service_id: service_id.to_string(),
        grain_id: entry.grain_id.to_string(),
        reminder_name: entry.reminder_name.clone(),
        grain_hash: entry.grain_hash(),
        etag: etag.to_string(),
    };
    to_document(&doc.id, &doc)
}

pub fn reminder_from_document(doc: Document) -> TableResult<ReminderEntry> {
    let id = doc_id(&doc);
    let stored: ReminderDocument =
        serde_json::from_value(doc.into()).map_err(|e| TableError::mapping(&id, e))?;
    Ok(ReminderEntry {
        grain_id: GrainId::from(stored.grain_id),
        reminder_name: stored.reminder_name,
        start_at: DateTime::from_timestamp_nanos(stored.start_at),
        period: Duration::from_nanos(stored.period),
        etag: Some(ETag::from(stored.etag)),
    })
}

// ── Helpers ───────────────────────────────────────────────────────

fn to_document<T: Serialize>(id: &str, value: &T) -> TableResult<Document> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(TableError::mapping(id, format!("expected object, got {other}"))),
        Err(e) => Err(TableError::mapping(id, e)),
    }
}

fn doc_id(doc: &Document) -> String {
    doc.get(silokeep_docstore::ID_FIELD)
        .and_then(serde_json::Value::as_str)
        .unwrap_or("<missing>")
        .to_string()
}

/// Encode an instant for storage in the row identified by `id`.
pub fn stored_time(id: &str, at: DateTime<Utc>) -> TableResult<i64> {
    at.timestamp_nanos_opt()
        .ok_or_else(|| TableError::mapping(id, format!("timestamp {at} out of storable range")))
}

/// Encode a query bound, clamping instants outside the storable range to
/// the nearest end of it.
pub fn stored_bound(at: DateTime<Utc>) -> i64 {
    match at.timestamp_nanos_opt() {
        Some(nanos) => nanos,
        None if at < DateTime::<Utc>::UNIX_EPOCH => i64::MIN,
        None => i64::MAX,
    }
}
