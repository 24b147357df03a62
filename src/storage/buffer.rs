//! Durable FIFO buffer for uploads awaiting upstream delivery.
//!
//! Backed by the `buffered_records` table so the queue survives process
//! restarts. Enqueue is a single transaction: a record is either fully
//! present or absent, never partial. Acknowledge is the only normal
//! deletion path; `drop_record` exists solely for the explicit
//! exhausted-attempts drop policy.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::storage::pool::DbPool;
use crate::storage::types::{BufferedRecord, UploadPayload};
use crate::storage::StorageError;

/// Durable FIFO queue of pending uploads.
#[derive(Clone)]
pub struct BufferStore {
    pool: Arc<DbPool>,
}

impl std::fmt::Debug for BufferStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferStore").finish_non_exhaustive()
    }
}

impl BufferStore {
    /// Create a new buffer store over the shared pool.
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Append an upload to the queue. Returns its sequence number.
    pub fn enqueue(&self, payload: &UploadPayload) -> Result<i64, StorageError> {
        let conn = self.pool.get()?;
        let body = serde_json::to_string(payload)?;

        let seq = conn.query_row(
            "INSERT INTO buffered_records (payload, enqueued_at) VALUES (?1, ?2) RETURNING seq",
            params![body, Utc::now().timestamp_micros()],
            |row| row.get(0),
        )?;

        tracing::debug!(seq, kind = payload.kind(), address = %payload.address(), "Upload buffered");
        Ok(seq)
    }

    /// The oldest unacknowledged record, if any.
    ///
    /// Records are always handed out in strict sequence order; a newer
    /// record is never visible while an older one is pending.
    pub fn peek_oldest(&self) -> Result<Option<BufferedRecord>, StorageError> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT seq, payload, enqueued_at, attempts, last_attempt_at
                 FROM buffered_records ORDER BY seq ASC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((seq, body, enqueued_at, attempts, last_attempt_at)) = row else {
            return Ok(None);
        };

        let payload: UploadPayload = serde_json::from_str(&body)?;
        Ok(Some(BufferedRecord {
            seq,
            payload,
            enqueued_at: DateTime::from_timestamp_micros(enqueued_at)
                .unwrap_or(DateTime::UNIX_EPOCH),
            attempts,
            last_attempt_at: last_attempt_at.and_then(DateTime::from_timestamp_micros),
        }))
    }

    /// Remove a record after acknowledged upstream delivery.
    pub fn acknowledge(&self, seq: i64) -> Result<(), StorageError> {
        let conn = self.pool.get()?;
        let deleted = conn.execute("DELETE FROM buffered_records WHERE seq = ?1", [seq])?;
        if deleted == 0 {
            return Err(StorageError::InvalidData(format!(
                "acknowledge for unknown buffered record seq {seq}"
            )));
        }
        Ok(())
    }

    /// Record a failed delivery attempt. Returns the new attempt count.
    pub fn mark_attempt(&self, seq: i64) -> Result<u32, StorageError> {
        let conn = self.pool.get()?;
        let attempts = conn.query_row(
            "UPDATE buffered_records SET attempts = attempts + 1, last_attempt_at = ?2
             WHERE seq = ?1 RETURNING attempts",
            params![seq, Utc::now().timestamp_micros()],
            |row| row.get(0),
        )?;
        Ok(attempts)
    }

    /// Remove a record without delivery (exhausted-attempts drop policy or
    /// permanent upstream rejection). The caller is responsible for the
    /// loss event.
    pub fn drop_record(&self, seq: i64) -> Result<(), StorageError> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM buffered_records WHERE seq = ?1", [seq])?;
        Ok(())
    }

    /// Number of pending records.
    pub fn depth(&self) -> Result<u64, StorageError> {
        let conn = self.pool.get()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM buffered_records", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::init_schema;
    use crate::storage::types::PrinterCreate;
    use tempfile::tempdir;

    fn register_payload(addr: &str) -> UploadPayload {
        UploadPayload::RegisterPrinter(PrinterCreate {
            ip: addr.to_string(),
            name: format!("Printer at {addr}"),
            location: None,
            model: None,
        })
    }

    fn test_buffer(dir: &tempfile::TempDir) -> BufferStore {
        let pool = DbPool::new(&dir.path().join("buffer.db"), 2).unwrap();
        init_schema(&pool.get().unwrap()).unwrap();
        BufferStore::new(pool)
    }

    #[test]
    fn test_fifo_order() {
        let dir = tempdir().unwrap();
        let buffer = test_buffer(&dir);

        let s1 = buffer.enqueue(&register_payload("192.0.2.1")).unwrap();
        let s2 = buffer.enqueue(&register_payload("192.0.2.2")).unwrap();
        let s3 = buffer.enqueue(&register_payload("192.0.2.3")).unwrap();
        assert!(s1 < s2 && s2 < s3);
        assert_eq!(buffer.depth().unwrap(), 3);

        // Oldest first, and never skipped while unacknowledged.
        assert_eq!(buffer.peek_oldest().unwrap().unwrap().seq, s1);
        assert_eq!(buffer.peek_oldest().unwrap().unwrap().seq, s1);

        buffer.acknowledge(s1).unwrap();
        assert_eq!(buffer.peek_oldest().unwrap().unwrap().seq, s2);
        buffer.acknowledge(s2).unwrap();
        buffer.acknowledge(s3).unwrap();
        assert!(buffer.peek_oldest().unwrap().is_none());
        assert_eq!(buffer.depth().unwrap(), 0);
    }

    #[test]
    fn test_mark_attempt_increments() {
        let dir = tempdir().unwrap();
        let buffer = test_buffer(&dir);

        let seq = buffer.enqueue(&register_payload("192.0.2.1")).unwrap();
        assert_eq!(buffer.peek_oldest().unwrap().unwrap().attempts, 0);

        assert_eq!(buffer.mark_attempt(seq).unwrap(), 1);
        assert_eq!(buffer.mark_attempt(seq).unwrap(), 2);

        let record = buffer.peek_oldest().unwrap().unwrap();
        assert_eq!(record.attempts, 2);
        assert!(record.last_attempt_at.is_some());
    }

    #[test]
    fn test_acknowledge_unknown_seq() {
        let dir = tempdir().unwrap();
        let buffer = test_buffer(&dir);
        assert!(buffer.acknowledge(42).is_err());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("restart.db");

        {
            let pool = DbPool::new(&db_path, 2).unwrap();
            init_schema(&pool.get().unwrap()).unwrap();
            let buffer = BufferStore::new(pool);
            buffer.enqueue(&register_payload("192.0.2.1")).unwrap();
            buffer.enqueue(&register_payload("192.0.2.2")).unwrap();
        }

        // Fresh pool over the same file: records and order survive.
        let pool = DbPool::new(&db_path, 2).unwrap();
        let buffer = BufferStore::new(pool);
        assert_eq!(buffer.depth().unwrap(), 2);
        let head = buffer.peek_oldest().unwrap().unwrap();
        assert_eq!(head.payload.address(), "192.0.2.1");
    }
}
