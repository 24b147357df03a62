//! SNMP printer probe.
//!
//! Issues read-only SNMP v2c GETs against a printer and maps the replies to
//! an [`Observation`]. A probe never fails: an unreachable device yields an
//! offline observation, a device that answers but cannot be decoded yields
//! an error observation with whatever fields were decodable.

use std::time::Duration;

use chrono::Utc;
use snmp::{SyncSession, Value};

use crate::collector::oids;
use crate::config::SnmpConfig;
use crate::storage::{ConnectionStatus, Observation};

/// Supply-table indices scanned for toner and drum units.
const SUPPLY_SCAN_MAX: u32 = 8;

/// Worst-case number of SNMP queries per device poll; together with the
/// per-query timeout this bounds the whole-device poll budget.
const PROBE_QUERY_BUDGET: u32 = 32;

/// A decoded SNMP scalar, owned so it outlives the response buffer.
enum Scalar {
    Int(i64),
    Text(String),
}

impl Scalar {
    fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Text(_) => None,
        }
    }

    fn into_text(self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s),
            Self::Int(_) => None,
        }
    }
}

/// SNMP collector for printer metrics.
#[derive(Debug, Clone)]
pub struct SnmpCollector {
    config: SnmpConfig,
}

impl SnmpCollector {
    /// Create a collector with the given protocol parameters.
    pub fn new(config: SnmpConfig) -> Self {
        Self { config }
    }

    /// Upper bound on one whole-device poll.
    pub fn poll_budget(&self) -> Duration {
        self.config.timeout * PROBE_QUERY_BUDGET
    }

    /// Poll one device.
    ///
    /// The blocking SNMP session runs on the blocking pool; an outer
    /// watchdog enforces the poll budget so a misbehaving device can never
    /// stall the scheduler past it.
    pub async fn poll(&self, address: &str) -> Observation {
        let ts = Utc::now();
        let target = format!("{}:{}", address, self.config.port);
        let community = self.config.community.clone().into_bytes();
        let timeout = self.config.timeout;

        let probe = tokio::task::spawn_blocking(move || probe_device(&target, &community, timeout));

        let raw = match tokio::time::timeout(self.poll_budget(), probe).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(address, error = %e, "Probe task failed");
                return Observation::offline(address, ts);
            }
            Err(_) => {
                tracing::warn!(address, budget = ?self.poll_budget(), "Probe exceeded poll budget");
                return Observation::offline(address, ts);
            }
        };

        raw.into_observation(address, ts)
    }
}

/// Raw probe result, produced on the blocking pool.
#[derive(Debug, Default)]
struct RawProbe {
    responded: bool,
    name: Option<String>,
    model: Option<String>,
    total_pages: Option<i64>,
    toner_level_pct: Option<u8>,
    toner_status: Option<String>,
    drum_level_pct: Option<u8>,
    device_status: Option<i32>,
}

impl RawProbe {
    fn into_observation(self, address: &str, ts: chrono::DateTime<Utc>) -> Observation {
        if !self.responded {
            tracing::debug!(address, "Device unreachable");
            return Observation::offline(address, ts);
        }

        let decoded_any = self.total_pages.is_some()
            || self.toner_level_pct.is_some()
            || self.toner_status.is_some()
            || self.drum_level_pct.is_some()
            || self.device_status.is_some();

        let status = if decoded_any {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Error
        };

        tracing::debug!(
            address,
            status = status.as_ref(),
            total_pages = ?self.total_pages,
            toner_level_pct = ?self.toner_level_pct,
            "Device probed"
        );

        Observation {
            address: address.to_string(),
            ts,
            status,
            name: self.name,
            model: self.model,
            total_pages: self.total_pages,
            toner_level_pct: self.toner_level_pct,
            toner_status: self.toner_status,
            drum_level_pct: self.drum_level_pct,
            device_status: self.device_status,
        }
    }
}

/// Run the full query sequence against one device. Blocking.
fn probe_device(target: &str, community: &[u8], timeout: Duration) -> RawProbe {
    let mut raw = RawProbe::default();

    let mut session = match SyncSession::new(target, community, Some(timeout), 0) {
        Ok(session) => session,
        Err(e) => {
            tracing::debug!(target, error = %e, "Failed to open SNMP session");
            return raw;
        }
    };

    // Reachability probe: one timeout bounds the unreachable-device case.
    if snmp_get(&mut session, oids::SYS_DESCR).is_none() {
        return raw;
    }
    raw.responded = true;

    raw.name = snmp_get(&mut session, oids::SYS_NAME).and_then(Scalar::into_text);
    raw.model = snmp_get(&mut session, oids::DEVICE_MODEL).and_then(Scalar::into_text);
    raw.device_status = snmp_get(&mut session, oids::DEVICE_STATUS)
        .and_then(|v| v.as_int())
        .and_then(|v| i32::try_from(v).ok());
    raw.total_pages = snmp_get(&mut session, oids::TOTAL_PAGES).and_then(|v| v.as_int());

    scan_supplies(&mut session, &mut raw);
    raw
}

/// Walk the supply table looking for black toner and drum units.
fn scan_supplies(session: &mut SyncSession, raw: &mut RawProbe) {
    for index in 1..=SUPPLY_SCAN_MAX {
        let Some(desc) = snmp_get(session, &oids::supply_description(index))
            .and_then(Scalar::into_text)
            .map(|d| d.to_lowercase())
        else {
            continue;
        };

        let current =
            snmp_get(session, &oids::supply_current_level(index)).and_then(|v| v.as_int());
        let max = snmp_get(session, &oids::supply_max_capacity(index)).and_then(|v| v.as_int());
        let (Some(current), Some(max)) = (current, max) else {
            continue;
        };

        if desc.contains("toner") && desc.contains("black") {
            let (pct, status) = supply_percentage(current, max);
            raw.toner_level_pct = pct;
            raw.toner_status = status;
        } else if desc.contains("drum") {
            raw.drum_level_pct = supply_percentage(current, max).0;
        }
    }
}

/// Issue one GET and decode the reply into an owned scalar.
///
/// Returns `None` on timeout, transport error, or an undecodable value
/// (NoSuchObject/NoSuchInstance included).
fn snmp_get(session: &mut SyncSession, oid: &[u32]) -> Option<Scalar> {
    let mut pdu = session.get(oid).ok()?;
    match pdu.varbinds.next() {
        Some((_oid, Value::Integer(i))) => Some(Scalar::Int(i)),
        Some((_oid, Value::Counter32(c))) => Some(Scalar::Int(i64::from(c))),
        Some((_oid, Value::Unsigned32(u))) => Some(Scalar::Int(i64::from(u))),
        Some((_oid, Value::Counter64(c))) => i64::try_from(c).ok().map(Scalar::Int),
        Some((_oid, Value::OctetString(bytes))) => {
            let text = String::from_utf8_lossy(bytes).trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(Scalar::Text(text))
            }
        }
        _ => None,
    }
}

/// Decode a supply level against its max capacity.
///
/// The Printer MIB uses negative sentinels: `-3` means the supply is OK but
/// the level is not reported, `-2` means unknown. Returns a percentage or a
/// status text, never both.
pub fn supply_percentage(current: i64, max: i64) -> (Option<u8>, Option<String>) {
    match current {
        -3 => (None, Some("OK".to_string())),
        -2 => (None, Some("Unknown".to_string())),
        c if c < 0 => (None, Some(format!("status {c}"))),
        c => {
            if max > 0 {
                let pct = (c.saturating_mul(100) / max).clamp(0, 100) as u8;
                (Some(pct), None)
            } else {
                (None, Some("not reported".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supply_percentage_normal() {
        assert_eq!(supply_percentage(65, 100), (Some(65), None));
        assert_eq!(supply_percentage(0, 100), (Some(0), None));
        assert_eq!(supply_percentage(3000, 8000), (Some(37), None));
    }

    #[test]
    fn test_supply_percentage_clamped() {
        // Some devices report current above max after a cartridge swap.
        assert_eq!(supply_percentage(120, 100), (Some(100), None));
    }

    #[test]
    fn test_supply_percentage_sentinels() {
        assert_eq!(supply_percentage(-3, 100), (None, Some("OK".to_string())));
        assert_eq!(
            supply_percentage(-2, 100),
            (None, Some("Unknown".to_string()))
        );
        assert_eq!(
            supply_percentage(-7, 100),
            (None, Some("status -7".to_string()))
        );
    }

    #[test]
    fn test_supply_percentage_invalid_max() {
        let (pct, status) = supply_percentage(50, 0);
        assert!(pct.is_none());
        assert!(status.is_some());

        let (pct, _) = supply_percentage(50, -2);
        assert!(pct.is_none());
    }

    #[tokio::test]
    async fn test_poll_unreachable_is_offline() {
        // TEST-NET-1 address with a short timeout: no device will answer.
        let collector = SnmpCollector::new(SnmpConfig {
            community: "public".to_string(),
            port: 161,
            timeout: Duration::from_millis(100),
        });

        let obs = collector.poll("192.0.2.1").await;
        assert_eq!(obs.status, ConnectionStatus::Offline);
        assert!(obs.total_pages.is_none());
        assert!(!obs.has_sample());
    }

    #[test]
    fn test_poll_budget_bounds_worst_case() {
        let collector = SnmpCollector::new(SnmpConfig {
            community: "public".to_string(),
            port: 161,
            timeout: Duration::from_secs(2),
        });
        assert_eq!(
            collector.poll_budget(),
            Duration::from_secs(2) * PROBE_QUERY_BUDGET
        );
    }
}
