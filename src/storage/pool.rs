//! Connection pool using r2d2.
//!
//! The scheduler (writer side) and the sync engine (drain side) share one
//! pool. Connections run in WAL mode with a busy timeout so the two loops
//! never observe a hard lock error; SQLite serializes the actual writes.

use std::path::Path;
use std::sync::Arc;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::storage::StorageError;

/// Pragmas applied to every pooled connection.
const CONN_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;
PRAGMA foreign_keys = ON;
"#;

/// SQLite connection pool shared by all storage facades.
pub struct DbPool {
    pool: Pool<SqliteConnectionManager>,
}

impl DbPool {
    /// Create a new pool for the database at `db_path`.
    ///
    /// Note: schema is expected to be initialized by [`crate::storage::StorageBuilder`].
    pub fn new(db_path: &Path, size: u32) -> Result<Arc<Self>, StorageError> {
        let manager = SqliteConnectionManager::file(db_path)
            .with_init(|conn| conn.execute_batch(CONN_PRAGMAS));
        let pool = Pool::builder().max_size(size).build(manager)?;

        Ok(Arc::new(Self { pool }))
    }

    /// Get a connection from the pool.
    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        Ok(self.pool.get()?)
    }
}

impl std::fmt::Debug for DbPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbPool").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::init_schema;
    use tempfile::tempdir;

    #[test]
    fn test_pool_creation() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let pool = DbPool::new(&db_path, 4).unwrap();
        let conn = pool.get().unwrap();
        init_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'printers'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_pool_shared_visibility() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("shared.db");

        let pool = DbPool::new(&db_path, 2).unwrap();
        init_schema(&pool.get().unwrap()).unwrap();

        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO printers (address, name, created_at) VALUES ('192.0.2.1', 'p', 0)",
                [],
            )
            .unwrap();

        // A different pooled connection sees the committed write.
        let count: i64 = pool
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM printers", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
