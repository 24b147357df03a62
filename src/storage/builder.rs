//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing the storage facades.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::storage::buffer::BufferStore;
use crate::storage::local::LocalStore;
use crate::storage::pool::DbPool;
use crate::storage::schema::init_schema;
use crate::storage::StorageError;

/// Minimum connection pool size.
const MIN_POOL_SIZE: u32 = 2;

/// Maximum connection pool size.
const MAX_POOL_SIZE: u32 = 8;

/// Calculate default pool size based on available CPU parallelism,
/// clamped between MIN_POOL_SIZE and MAX_POOL_SIZE.
fn default_pool_size() -> u32 {
    std::thread::available_parallelism()
        .map(|p| (p.get() as u32).clamp(MIN_POOL_SIZE, MAX_POOL_SIZE))
        .unwrap_or(MIN_POOL_SIZE)
}

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    db_path: PathBuf,
    pool_size: u32,
}

impl StorageBuilder {
    /// Create a new storage builder.
    ///
    /// Pool size defaults to the number of available CPUs (clamped to 2-8).
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            pool_size: default_pool_size(),
        }
    }

    /// Set the connection pool size.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size.clamp(MIN_POOL_SIZE, MAX_POOL_SIZE);
        self
    }

    /// Build the storage layer and return handles.
    ///
    /// Failure here (unwritable path, corrupt file) is the one storage error
    /// that is fatal to the process.
    pub fn build(self) -> Result<StorageHandles, StorageError> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Internal(format!(
                        "failed to create database directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let pool = DbPool::new(&self.db_path, self.pool_size)?;
        let conn = pool.get()?;
        init_schema(&conn)?;
        drop(conn);

        Ok(StorageHandles {
            local: LocalStore::new(Arc::clone(&pool)),
            buffer: BufferStore::new(Arc::clone(&pool)),
            pool,
        })
    }
}

/// Handles to the storage layer facades.
pub struct StorageHandles {
    /// Shared connection pool.
    pub pool: Arc<DbPool>,
    /// Printers and metric samples.
    pub local: LocalStore,
    /// Durable delivery queue.
    pub buffer: BufferStore,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builder_creates_schema_and_parent_dir() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("agent.db");

        let handles = StorageBuilder::new(&db_path).pool_size(2).build().unwrap();
        assert!(db_path.exists());
        assert!(handles.local.health_check());
        assert_eq!(handles.buffer.depth().unwrap(), 0);
    }

    #[test]
    fn test_default_pool_size_within_bounds() {
        let size = default_pool_size();
        assert!(size >= MIN_POOL_SIZE);
        assert!(size <= MAX_POOL_SIZE);
    }
}
