//! Polymorphic storage backend.
//!
//! Exactly two variants, chosen once at startup: `Local` writes samples to
//! the embedded store, `Remote` delivers them to the upstream service and
//! falls back to the durable buffer on retryable failure. There is no
//! runtime switching; the buffer's durability contract assumes a fixed
//! backend for the process lifetime.

use std::sync::Arc;

use crate::health::AgentHealth;
use crate::storage::buffer::BufferStore;
use crate::storage::local::{LocalStore, PrinterSeed};
use crate::storage::remote::RemoteClient;
use crate::storage::types::{
    MetricSample, MetricsIngest, Observation, Printer, PrinterCreate, UploadPayload,
};
use crate::storage::StorageError;

/// Result of a write through the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Durably recorded (embedded store or acknowledged upstream).
    Stored,
    /// Buffered for deferred delivery under the given sequence number.
    Deferred(i64),
    /// Dropped with a logged, counted loss event (permanent rejection, or
    /// retryable failure with buffering disabled).
    Dropped,
}

/// Storage backend selected at startup.
pub enum StorageBackend {
    /// Embedded SQLite store.
    Local(LocalBackend),
    /// Upstream HTTP service with durable buffering.
    Remote(RemoteBackend),
}

/// Local variant: the embedded store is the system of record.
pub struct LocalBackend {
    store: LocalStore,
}

/// Remote variant: upstream service plus identity mirror and delivery buffer.
pub struct RemoteBackend {
    mirror: LocalStore,
    client: RemoteClient,
    buffer: Option<BufferStore>,
    health: Arc<AgentHealth>,
}

impl std::fmt::Debug for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageBackend")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl StorageBackend {
    /// Build the local variant.
    pub fn local(store: LocalStore) -> Self {
        Self::Local(LocalBackend { store })
    }

    /// Build the remote variant.
    pub fn remote(
        mirror: LocalStore,
        client: RemoteClient,
        buffer: Option<BufferStore>,
        health: Arc<AgentHealth>,
    ) -> Self {
        Self::Remote(RemoteBackend {
            mirror,
            client,
            buffer,
            health,
        })
    }

    /// Mode label for logs and the status API.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Remote(_) => "remote",
        }
    }

    /// The embedded store (system of record in local mode, identity mirror
    /// and target cache in remote mode).
    pub fn local_store(&self) -> &LocalStore {
        match self {
            Self::Local(b) => &b.store,
            Self::Remote(b) => &b.mirror,
        }
    }

    /// Record one metric sample for a resolved printer.
    ///
    /// Local mode: a synchronous embedded write; an error is fatal for this
    /// write only and propagates to the caller. Remote mode: never fails the
    /// polling cycle on upstream unavailability — the sample is buffered
    /// (`Deferred`) or, with buffering disabled, dropped with a counted loss.
    pub async fn record_metric(
        &self,
        printer: &Printer,
        obs: &Observation,
    ) -> Result<WriteOutcome, StorageError> {
        match self {
            Self::Local(b) => {
                let sample = MetricSample::from_observation(printer.id, obs);
                b.store.insert_metric(&sample)?;
                Ok(WriteOutcome::Stored)
            }
            Self::Remote(b) => {
                let payload = UploadPayload::SubmitMetrics(MetricsIngest::from_observation(obs));
                b.try_upload(payload).await
            }
        }
    }

    /// Push a printer identity upstream (no-op in local mode).
    pub async fn publish_registration(
        &self,
        printer: &Printer,
    ) -> Result<WriteOutcome, StorageError> {
        match self {
            Self::Local(_) => Ok(WriteOutcome::Stored),
            Self::Remote(b) => {
                let payload = UploadPayload::RegisterPrinter(PrinterCreate {
                    ip: printer.address.clone(),
                    name: printer.name.clone(),
                    location: printer.location.clone(),
                    model: printer.model.clone(),
                });
                b.try_upload(payload).await
            }
        }
    }

    /// Refresh the target set from upstream (remote mode with discovery).
    ///
    /// Newly listed printers are merged into the mirror; an unreachable
    /// upstream leaves the cached target set in place. Returns the number
    /// of targets added.
    pub async fn refresh_targets(&self) -> Result<usize, StorageError> {
        let Self::Remote(b) = self else {
            return Ok(0);
        };

        let listed = match b.client.list_printers().await {
            Ok(listed) => listed,
            Err(e) => {
                tracing::debug!(error = %e, "Target refresh failed, using cached targets");
                return Ok(0);
            }
        };

        let mut added = 0;
        for summary in listed {
            let seed = PrinterSeed {
                address: summary.ip,
                name: summary.name,
                location: summary.location,
                model: summary.model,
            };
            if b.mirror.insert_if_absent(&seed)?.is_some() {
                added += 1;
            }
        }

        if added > 0 {
            tracing::info!(added, "Targets added from upstream");
        }
        Ok(added)
    }

    /// Probe backend availability.
    pub async fn health_check(&self) -> bool {
        match self {
            Self::Local(b) => b.store.health_check(),
            Self::Remote(b) => b.client.health().await,
        }
    }
}

impl RemoteBackend {
    /// Deliver an upload directly, deferring to the buffer on retryable
    /// failure.
    ///
    /// While a backlog exists, new uploads are enqueued behind it instead of
    /// attempted directly, so a recovered upstream never observes a newer
    /// sample before an older buffered one from the same printer.
    async fn try_upload(&self, payload: UploadPayload) -> Result<WriteOutcome, StorageError> {
        if let Some(buffer) = &self.buffer {
            if buffer.depth()? > 0 {
                let seq = buffer.enqueue(&payload)?;
                self.health.set_buffer_depth(buffer.depth()?);
                return Ok(WriteOutcome::Deferred(seq));
            }
        }

        match self.client.deliver(&payload).await {
            Ok(()) => {
                self.health.reset_upstream_failures();
                Ok(WriteOutcome::Stored)
            }
            Err(e) if e.is_retryable() => {
                self.health.record_upstream_failure();
                match &self.buffer {
                    Some(buffer) => {
                        let seq = buffer.enqueue(&payload)?;
                        self.health.set_buffer_depth(buffer.depth()?);
                        tracing::warn!(
                            seq,
                            kind = payload.kind(),
                            address = %payload.address(),
                            error = %e,
                            "Direct upload failed, buffered for deferred delivery"
                        );
                        Ok(WriteOutcome::Deferred(seq))
                    }
                    None => {
                        self.health.record_loss(1);
                        tracing::error!(
                            kind = payload.kind(),
                            address = %payload.address(),
                            error = %e,
                            "Upload failed with buffering disabled, record lost"
                        );
                        Ok(WriteOutcome::Dropped)
                    }
                }
            }
            Err(e) => {
                self.health.record_loss(1);
                tracing::error!(
                    kind = payload.kind(),
                    address = %payload.address(),
                    error = %e,
                    "Upload rejected by upstream, record dropped"
                );
                Ok(WriteOutcome::Dropped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::init_schema;
    use crate::storage::types::ConnectionStatus;
    use crate::storage::DbPool;
    use chrono::Utc;
    use tempfile::tempdir;

    fn local_backend(dir: &tempfile::TempDir) -> StorageBackend {
        let pool = DbPool::new(&dir.path().join("backend.db"), 2).unwrap();
        init_schema(&pool.get().unwrap()).unwrap();
        StorageBackend::local(LocalStore::new(pool))
    }

    fn connected_obs(address: &str, pages: i64) -> Observation {
        Observation {
            address: address.to_string(),
            ts: Utc::now(),
            status: ConnectionStatus::Connected,
            name: None,
            model: None,
            total_pages: Some(pages),
            toner_level_pct: Some(50),
            toner_status: None,
            drum_level_pct: None,
            device_status: Some(2),
        }
    }

    #[tokio::test]
    async fn test_local_record_metric() {
        let dir = tempdir().unwrap();
        let backend = local_backend(&dir);

        let printer = backend
            .local_store()
            .insert_printer(&PrinterSeed::new("192.0.2.10"))
            .unwrap();

        let outcome = backend
            .record_metric(&printer, &connected_obs("192.0.2.10", 100))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Stored);

        let samples = backend
            .local_store()
            .metrics_for_printer(printer.id)
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].total_pages, Some(100));
    }

    #[tokio::test]
    async fn test_local_registration_is_noop_upstream() {
        let dir = tempdir().unwrap();
        let backend = local_backend(&dir);
        let printer = backend
            .local_store()
            .insert_printer(&PrinterSeed::new("192.0.2.10"))
            .unwrap();

        let outcome = backend.publish_registration(&printer).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Stored);
    }

    #[tokio::test]
    async fn test_local_refresh_targets_is_noop() {
        let dir = tempdir().unwrap();
        let backend = local_backend(&dir);
        assert_eq!(backend.refresh_targets().await.unwrap(), 0);
    }
}
