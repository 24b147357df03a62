//! Embedded store facade.
//!
//! Synchronous CRUD over the pooled SQLite connections. In local mode this
//! is the system of record; in remote mode it is the identity mirror and
//! target cache backing the upstream service.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::storage::pool::DbPool;
use crate::storage::types::{ConnectionStatus, MetricSample, Printer};
use crate::storage::StorageError;

/// Identity attributes for creating or merging a printer row.
#[derive(Debug, Clone, Default)]
pub struct PrinterSeed {
    /// Network address (identity key).
    pub address: String,
    /// Display name; a placeholder is generated when absent.
    pub name: Option<String>,
    /// Physical location.
    pub location: Option<String>,
    /// Device model.
    pub model: Option<String>,
}

impl PrinterSeed {
    /// Seed with only an address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Display name, falling back to the placeholder used on first contact.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Printer at {}", self.address))
    }
}

/// Embedded store facade for printers and metric samples.
#[derive(Clone)]
pub struct LocalStore {
    pool: Arc<DbPool>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Create a new store over the shared pool.
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Printers
    // =========================================================================

    /// Look up a printer by network address.
    pub fn get_by_address(&self, address: &str) -> Result<Option<Printer>, StorageError> {
        let conn = self.pool.get()?;
        let printer = conn
            .query_row(
                "SELECT id, address, name, location, model, status, last_seen_at, created_at
                 FROM printers WHERE address = ?1",
                [address],
                map_printer,
            )
            .optional()?;
        Ok(printer)
    }

    /// Insert a new printer row and return it.
    ///
    /// Fails if the address already exists; callers decide create-vs-update
    /// via [`Self::get_by_address`].
    pub fn insert_printer(&self, seed: &PrinterSeed) -> Result<Printer, StorageError> {
        let conn = self.pool.get()?;
        let now = Utc::now();

        let printer = conn.query_row(
            "INSERT INTO printers (address, name, location, model, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id, address, name, location, model, status, last_seen_at, created_at",
            params![
                seed.address,
                seed.display_name(),
                seed.location,
                seed.model,
                ConnectionStatus::Offline.as_ref(),
                now.timestamp_micros(),
            ],
            map_printer,
        )?;

        tracing::info!(address = %printer.address, name = %printer.name, "Printer registered");
        Ok(printer)
    }

    /// Insert a printer only if the address is not yet known.
    ///
    /// Returns the new row ID, or `None` if the printer already existed.
    pub fn insert_if_absent(&self, seed: &PrinterSeed) -> Result<Option<i64>, StorageError> {
        if self.get_by_address(&seed.address)?.is_some() {
            return Ok(None);
        }
        let printer = self.insert_printer(seed)?;
        Ok(Some(printer.id))
    }

    /// Update identity attributes (name/location/model) of a printer row.
    pub fn update_identity(
        &self,
        id: i64,
        name: &str,
        location: Option<&str>,
        model: Option<&str>,
    ) -> Result<(), StorageError> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE printers SET name = ?2, location = ?3, model = ?4 WHERE id = ?1",
            params![id, name, location, model],
        )?;
        Ok(())
    }

    /// Overwrite connection status, and last-seen when the device answered.
    pub fn touch_status(
        &self,
        id: i64,
        status: ConnectionStatus,
        seen_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        let conn = self.pool.get()?;
        match seen_at {
            Some(ts) => {
                conn.execute(
                    "UPDATE printers SET status = ?2, last_seen_at = ?3 WHERE id = ?1",
                    params![id, status.as_ref(), ts.timestamp_micros()],
                )?;
            }
            None => {
                conn.execute(
                    "UPDATE printers SET status = ?2 WHERE id = ?1",
                    params![id, status.as_ref()],
                )?;
            }
        }
        Ok(())
    }

    /// List all known printers, ordered by location then name.
    pub fn list_printers(&self) -> Result<Vec<Printer>, StorageError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, address, name, location, model, status, last_seen_at, created_at
             FROM printers ORDER BY location, name",
        )?;
        let printers = stmt
            .query_map([], map_printer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(printers)
    }

    /// Number of known printers.
    pub fn printer_count(&self) -> Result<u64, StorageError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM printers", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    // =========================================================================
    // Metrics
    // =========================================================================

    /// Append a metric sample. Returns the new row ID.
    pub fn insert_metric(&self, sample: &MetricSample) -> Result<i64, StorageError> {
        let conn = self.pool.get()?;
        let id = conn.query_row(
            "INSERT INTO metrics (printer_id, sample_key, ts, total_pages, toner_level_pct,
                                  toner_status, drum_level_pct, device_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING id",
            params![
                sample.printer_id,
                sample.sample_key.to_string(),
                sample.ts.timestamp_micros(),
                sample.total_pages,
                sample.toner_level_pct,
                sample.toner_status,
                sample.drum_level_pct,
                sample.device_status,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Samples for one printer in observation order (oldest first).
    pub fn metrics_for_printer(&self, printer_id: i64) -> Result<Vec<MetricSample>, StorageError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, printer_id, sample_key, ts, total_pages, toner_level_pct,
                    toner_status, drum_level_pct, device_status
             FROM metrics WHERE printer_id = ?1 ORDER BY ts ASC, id ASC",
        )?;
        let samples = stmt
            .query_map([printer_id], map_sample)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// Check that the store answers a trivial query.
    pub fn health_check(&self) -> bool {
        match self.pool.get() {
            Ok(conn) => conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "Local store health check failed");
                false
            }
        }
    }
}

fn map_printer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Printer> {
    let status_str: String = row.get(5)?;
    let last_seen: Option<i64> = row.get(6)?;
    Ok(Printer {
        id: row.get(0)?,
        address: row.get(1)?,
        name: row.get(2)?,
        location: row.get(3)?,
        model: row.get(4)?,
        status: ConnectionStatus::from_str(&status_str).unwrap_or(ConnectionStatus::Offline),
        last_seen_at: last_seen.and_then(DateTime::from_timestamp_micros),
        created_at: DateTime::from_timestamp_micros(row.get(7)?).unwrap_or(DateTime::UNIX_EPOCH),
    })
}

fn map_sample(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetricSample> {
    let key_str: String = row.get(2)?;
    Ok(MetricSample {
        id: Some(row.get(0)?),
        printer_id: row.get(1)?,
        sample_key: Uuid::from_str(&key_str).unwrap_or(Uuid::nil()),
        ts: DateTime::from_timestamp_micros(row.get(3)?).unwrap_or(DateTime::UNIX_EPOCH),
        total_pages: row.get(4)?,
        toner_level_pct: row.get(5)?,
        toner_status: row.get(6)?,
        drum_level_pct: row.get(7)?,
        device_status: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::init_schema;
    use tempfile::tempdir;

    fn test_store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempdir().unwrap();
        let pool = DbPool::new(&dir.path().join("test.db"), 2).unwrap();
        init_schema(&pool.get().unwrap()).unwrap();
        (dir, LocalStore::new(pool))
    }

    #[test]
    fn test_insert_and_get_printer() {
        let (_dir, store) = test_store();

        let seed = PrinterSeed {
            address: "192.0.2.10".to_string(),
            name: Some("Front desk".to_string()),
            location: Some("Reception".to_string()),
            model: None,
        };
        let printer = store.insert_printer(&seed).unwrap();
        assert_eq!(printer.address, "192.0.2.10");
        assert_eq!(printer.name, "Front desk");
        assert_eq!(printer.status, ConnectionStatus::Offline);
        assert!(printer.last_seen_at.is_none());

        let fetched = store.get_by_address("192.0.2.10").unwrap().unwrap();
        assert_eq!(fetched.id, printer.id);
        assert_eq!(fetched.location.as_deref(), Some("Reception"));
    }

    #[test]
    fn test_placeholder_name() {
        let (_dir, store) = test_store();
        let printer = store
            .insert_printer(&PrinterSeed::new("192.0.2.77"))
            .unwrap();
        assert_eq!(printer.name, "Printer at 192.0.2.77");
    }

    #[test]
    fn test_insert_if_absent() {
        let (_dir, store) = test_store();
        let seed = PrinterSeed::new("192.0.2.10");

        assert!(store.insert_if_absent(&seed).unwrap().is_some());
        assert!(store.insert_if_absent(&seed).unwrap().is_none());
        assert_eq!(store.printer_count().unwrap(), 1);
    }

    #[test]
    fn test_touch_status() {
        let (_dir, store) = test_store();
        let printer = store
            .insert_printer(&PrinterSeed::new("192.0.2.10"))
            .unwrap();

        let seen = Utc::now();
        store
            .touch_status(printer.id, ConnectionStatus::Connected, Some(seen))
            .unwrap();

        let fetched = store.get_by_address("192.0.2.10").unwrap().unwrap();
        assert_eq!(fetched.status, ConnectionStatus::Connected);
        assert_eq!(
            fetched.last_seen_at.unwrap().timestamp_micros(),
            seen.timestamp_micros()
        );

        // Offline probe overwrites status but keeps last_seen.
        store
            .touch_status(printer.id, ConnectionStatus::Offline, None)
            .unwrap();
        let fetched = store.get_by_address("192.0.2.10").unwrap().unwrap();
        assert_eq!(fetched.status, ConnectionStatus::Offline);
        assert!(fetched.last_seen_at.is_some());
    }

    #[test]
    fn test_metrics_append_only_order() {
        let (_dir, store) = test_store();
        let printer = store
            .insert_printer(&PrinterSeed::new("192.0.2.10"))
            .unwrap();

        let base = Utc::now();
        for (i, pages) in [12450i64, 12480].iter().enumerate() {
            let obs = crate::storage::Observation {
                address: "192.0.2.10".to_string(),
                ts: base + chrono::Duration::minutes(5 * i as i64),
                status: ConnectionStatus::Connected,
                name: None,
                model: None,
                total_pages: Some(*pages),
                toner_level_pct: Some(65 - 3 * i as u8),
                toner_status: None,
                drum_level_pct: None,
                device_status: Some(2),
            };
            store
                .insert_metric(&MetricSample::from_observation(printer.id, &obs))
                .unwrap();
        }

        let samples = store.metrics_for_printer(printer.id).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples[0].ts < samples[1].ts);
        assert_eq!(samples[0].total_pages, Some(12450));
        assert_eq!(samples[1].total_pages, Some(12480));
        assert_eq!(samples[0].toner_level_pct, Some(65));
        assert_eq!(samples[1].toner_level_pct, Some(62));
    }

    #[test]
    fn test_health_check() {
        let (_dir, store) = test_store();
        assert!(store.health_check());
    }
}
