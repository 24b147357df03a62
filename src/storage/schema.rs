//! Database schema definitions.

use rusqlite::Connection;

use crate::storage::StorageError;

/// SQL statement for creating the printers table.
///
/// One row per monitored device; `address` is the identity key and is
/// unique within the agent's store. Timestamps are Unix micros.
pub const PRINTERS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS printers (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    address      TEXT NOT NULL UNIQUE,
    name         TEXT NOT NULL,
    location     TEXT,
    model        TEXT,
    status       TEXT NOT NULL DEFAULT 'offline',
    last_seen_at INTEGER,
    created_at   INTEGER NOT NULL
);
"#;

/// SQL statement for creating the metrics table.
///
/// Append-only sample log. `sample_key` is the deterministic delivery
/// deduplication key carried through to the upstream service.
pub const METRICS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    printer_id      INTEGER NOT NULL REFERENCES printers (id),
    sample_key      TEXT NOT NULL,
    ts              INTEGER NOT NULL,
    total_pages     INTEGER,
    toner_level_pct INTEGER,
    toner_status    TEXT,
    drum_level_pct  INTEGER,
    device_status   INTEGER
);
CREATE INDEX IF NOT EXISTS idx_metrics_ts ON metrics (ts);
CREATE INDEX IF NOT EXISTS idx_metrics_printer_id ON metrics (printer_id);
"#;

/// SQL statement for creating the buffered_records table.
///
/// Durable FIFO queue of uploads awaiting upstream acknowledgment.
/// `seq` (AUTOINCREMENT) defines delivery order; rows are deleted only
/// on acknowledged delivery or by the explicit drop policy.
pub const BUFFERED_RECORDS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS buffered_records (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    payload         TEXT NOT NULL,
    enqueued_at     INTEGER NOT NULL,
    attempts        INTEGER NOT NULL DEFAULT 0,
    last_attempt_at INTEGER
);
"#;

/// Initialize the database schema.
///
/// Creates all necessary tables and indexes if they don't exist.
pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(PRINTERS_TABLE_DDL)?;
    conn.execute_batch(METRICS_TABLE_DDL)?;
    conn.execute_batch(BUFFERED_RECORDS_TABLE_DDL)?;

    tracing::info!("Database schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_schema_initialization() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        assert!(table_exists(&conn, "printers"));
        assert!(table_exists(&conn, "metrics"));
        assert!(table_exists(&conn, "buffered_records"));
    }

    #[test]
    fn test_schema_init_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert!(table_exists(&conn, "printers"));
    }

    #[test]
    fn test_printer_address_unique() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO printers (address, name, created_at) VALUES ('192.0.2.10', 'a', 0)",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO printers (address, name, created_at) VALUES ('192.0.2.10', 'b', 0)",
            [],
        );
        assert!(dup.is_err());
    }
}
