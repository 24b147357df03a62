//! Core data types for the storage layer.
//!
//! This module defines the primary data structures used throughout the agent:
//!
//! - [`Printer`]: durable identity of a monitored device, keyed by address
//! - [`Observation`]: one collector result for a device
//! - [`MetricSample`]: one append-only metrics row derived from an observation
//! - [`UploadPayload`] / [`BufferedRecord`]: uploads queued for the upstream service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Connection status of a monitored printer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConnectionStatus {
    /// Device answered and metrics were decoded.
    Connected,
    /// Device did not answer within the protocol timeout.
    Offline,
    /// Device answered but the response could not be decoded.
    Error,
}

/// A monitored printer stored in the `printers` table.
///
/// The network address is the sole identity key: resolving the same address
/// repeatedly always updates this row in place, never creates a second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Printer {
    /// Database row ID.
    pub id: i64,
    /// Network address (unique key).
    pub address: String,
    /// Display name.
    pub name: String,
    /// Physical location, if known.
    pub location: Option<String>,
    /// Device model string, if discovered.
    pub model: Option<String>,
    /// Latest connection status.
    pub status: ConnectionStatus,
    /// Last time the device answered a probe (UTC).
    pub last_seen_at: Option<DateTime<Utc>>,
    /// First-contact timestamp (UTC).
    pub created_at: DateTime<Utc>,
}

/// One collector result for a device.
///
/// Fields that could not be decoded are `None`; a partial response is still
/// a valid observation. `status` classifies the probe outcome as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Probed network address.
    pub address: String,
    /// Observation timestamp (UTC).
    pub ts: DateTime<Utc>,
    /// Probe outcome.
    pub status: ConnectionStatus,
    /// Device-reported system name.
    pub name: Option<String>,
    /// Device-reported model string.
    pub model: Option<String>,
    /// Lifetime page count.
    pub total_pages: Option<i64>,
    /// Black toner level, 0-100.
    pub toner_level_pct: Option<u8>,
    /// Toner status text when the level is not reported numerically.
    pub toner_status: Option<String>,
    /// Drum unit level, 0-100.
    pub drum_level_pct: Option<u8>,
    /// Raw device status code (hrDeviceStatus).
    pub device_status: Option<i32>,
}

impl Observation {
    /// Create an observation for a device that did not answer.
    pub fn offline(address: impl Into<String>, ts: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            ts,
            status: ConnectionStatus::Offline,
            name: None,
            model: None,
            total_pages: None,
            toner_level_pct: None,
            toner_status: None,
            drum_level_pct: None,
            device_status: None,
        }
    }

    /// Deterministic delivery deduplication key for this observation.
    ///
    /// Derived from address and timestamp only, so a redelivered sample
    /// always carries the same key.
    pub fn sample_key(&self) -> Uuid {
        let seed = format!("{}|{}", self.address, self.ts.timestamp_micros());
        Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes())
    }

    /// Whether the probe produced a recordable sample.
    ///
    /// Offline probes update the printer identity but yield no sample.
    pub fn has_sample(&self) -> bool {
        self.status != ConnectionStatus::Offline
    }
}

/// A metric sample stored in the `metrics` table.
///
/// Append-only: never mutated or deleted by the agent after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    /// Database row ID (None before insertion).
    pub id: Option<i64>,
    /// Owning printer row ID.
    pub printer_id: i64,
    /// Deterministic deduplication key.
    pub sample_key: Uuid,
    /// Observation timestamp (UTC).
    pub ts: DateTime<Utc>,
    /// Lifetime page count.
    pub total_pages: Option<i64>,
    /// Black toner level, 0-100.
    pub toner_level_pct: Option<u8>,
    /// Toner status text.
    pub toner_status: Option<String>,
    /// Drum unit level, 0-100.
    pub drum_level_pct: Option<u8>,
    /// Raw device status code.
    pub device_status: Option<i32>,
}

impl MetricSample {
    /// Build a sample from an observation for the given printer row.
    pub fn from_observation(printer_id: i64, obs: &Observation) -> Self {
        Self {
            id: None,
            printer_id,
            sample_key: obs.sample_key(),
            ts: obs.ts,
            total_pages: obs.total_pages,
            toner_level_pct: obs.toner_level_pct,
            toner_status: obs.toner_status.clone(),
            drum_level_pct: obs.drum_level_pct,
            device_status: obs.device_status,
        }
    }
}

// =============================================================================
// Upstream wire types
// =============================================================================

/// Printer registration request body (`POST /api/v1/printers`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterCreate {
    /// Network address.
    pub ip: String,
    /// Display name.
    pub name: String,
    /// Physical location.
    pub location: Option<String>,
    /// Device model.
    pub model: Option<String>,
}

/// Metric fields in a submission body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsData {
    pub total_pages: Option<i64>,
    pub toner_level_pct: Option<u8>,
    pub toner_status: Option<String>,
    pub drum_level_pct: Option<u8>,
    pub device_status: Option<i32>,
    pub model: Option<String>,
}

/// Metric submission request body (`POST /api/v1/metrics`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsIngest {
    /// Printer network address (the upstream identity key).
    pub printer_id: String,
    /// Deterministic deduplication key for this sample.
    pub sample_key: Uuid,
    /// Observation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Observed metric fields.
    pub metrics: MetricsData,
}

impl MetricsIngest {
    /// Build a submission body from an observation.
    pub fn from_observation(obs: &Observation) -> Self {
        Self {
            printer_id: obs.address.clone(),
            sample_key: obs.sample_key(),
            timestamp: obs.ts,
            metrics: MetricsData {
                total_pages: obs.total_pages,
                toner_level_pct: obs.toner_level_pct,
                toner_status: obs.toner_status.clone(),
                drum_level_pct: obs.drum_level_pct,
                device_status: obs.device_status,
                model: obs.model.clone(),
            },
        }
    }
}

/// Printer summary returned by the upstream list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PrinterSummary {
    /// Network address.
    pub ip: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Physical location.
    #[serde(default)]
    pub location: Option<String>,
    /// Device model.
    #[serde(default)]
    pub model: Option<String>,
}

/// One upload awaiting upstream delivery.
///
/// Registrations and metric submissions share the same queue so a printer's
/// registration is always delivered before its first buffered sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadPayload {
    /// Printer registration upload.
    RegisterPrinter(PrinterCreate),
    /// Metric sample upload.
    SubmitMetrics(MetricsIngest),
}

impl UploadPayload {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RegisterPrinter(_) => "register_printer",
            Self::SubmitMetrics(_) => "submit_metrics",
        }
    }

    /// Address of the printer this upload concerns.
    pub fn address(&self) -> &str {
        match self {
            Self::RegisterPrinter(p) => &p.ip,
            Self::SubmitMetrics(m) => &m.printer_id,
        }
    }
}

/// A buffered upload row from the `buffered_records` table.
#[derive(Debug, Clone)]
pub struct BufferedRecord {
    /// Delivery sequence number (FIFO order).
    pub seq: i64,
    /// The upload to deliver.
    pub payload: UploadPayload,
    /// When the record was enqueued (UTC).
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed delivery attempts so far.
    pub attempts: u32,
    /// Timestamp of the most recent attempt (UTC).
    pub last_attempt_at: Option<DateTime<Utc>>,
}
