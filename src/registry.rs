//! Printer identity resolution.
//!
//! The registry is the only component that decides create-vs-update for a
//! printer identity. Address equality is the sole identity key: resolving
//! the same address repeatedly always updates the existing row in place.

use std::sync::Arc;

use crate::storage::{
    ConnectionStatus, Observation, Printer, PrinterSeed, StorageBackend, StorageError,
};

/// Resolves observations to stable printer identities.
pub struct PrinterRegistry {
    backend: Arc<StorageBackend>,
}

impl std::fmt::Debug for PrinterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterRegistry").finish_non_exhaustive()
    }
}

impl PrinterRegistry {
    /// Create a registry over the selected backend.
    pub fn new(backend: Arc<StorageBackend>) -> Self {
        Self { backend }
    }

    /// Resolve an observation to a printer identity.
    ///
    /// Creates the identity on first contact (name falls back to a
    /// placeholder), merges newly observed attributes into an existing one,
    /// and always overwrites connection status; last-seen is overwritten
    /// only when the device answered. Identity changes are pushed upstream
    /// in remote mode, through the same buffered path as any upload.
    pub async fn resolve(&self, obs: &Observation) -> Result<Printer, StorageError> {
        let store = self.backend.local_store();

        let (mut printer, identity_changed) = match store.get_by_address(&obs.address)? {
            None => {
                let seed = PrinterSeed {
                    address: obs.address.clone(),
                    name: obs.name.clone(),
                    location: None,
                    model: obs.model.clone(),
                };
                (store.insert_printer(&seed)?, true)
            }
            Some(existing) => {
                let merged = merge_attributes(&existing, obs);
                if merged {
                    let updated_name = pick_name(&existing, obs);
                    let updated_model = obs.model.clone().or_else(|| existing.model.clone());
                    store.update_identity(
                        existing.id,
                        &updated_name,
                        existing.location.as_deref(),
                        updated_model.as_deref(),
                    )?;
                    let mut p = existing;
                    p.name = updated_name;
                    p.model = updated_model;
                    (p, true)
                } else {
                    (existing, false)
                }
            }
        };

        let seen_at = (obs.status != ConnectionStatus::Offline).then_some(obs.ts);
        store.touch_status(printer.id, obs.status, seen_at)?;
        printer.status = obs.status;
        if seen_at.is_some() {
            printer.last_seen_at = seen_at;
        }

        if identity_changed {
            self.backend.publish_registration(&printer).await?;
        }

        Ok(printer)
    }
}

/// Whether the observation carries identity attributes the stored row lacks.
fn merge_attributes(existing: &Printer, obs: &Observation) -> bool {
    let model_changed = match (&obs.model, &existing.model) {
        (Some(observed), Some(stored)) => observed != stored,
        (Some(_), None) => true,
        (None, _) => false,
    };
    let name_changed = pick_name(existing, obs) != existing.name;
    model_changed || name_changed
}

/// A device-reported name replaces only the first-contact placeholder;
/// operator-assigned names are never clobbered by the device.
fn pick_name(existing: &Printer, obs: &Observation) -> String {
    let placeholder = format!("Printer at {}", existing.address);
    match &obs.name {
        Some(observed) if existing.name == placeholder => observed.clone(),
        _ => existing.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{init_schema, DbPool, LocalStore};
    use chrono::Utc;
    use tempfile::tempdir;

    fn test_registry(dir: &tempfile::TempDir) -> PrinterRegistry {
        let pool = DbPool::new(&dir.path().join("registry.db"), 2).unwrap();
        init_schema(&pool.get().unwrap()).unwrap();
        let backend = Arc::new(StorageBackend::local(LocalStore::new(pool)));
        PrinterRegistry::new(backend)
    }

    fn observation(address: &str, status: ConnectionStatus) -> Observation {
        Observation {
            address: address.to_string(),
            ts: Utc::now(),
            status,
            name: None,
            model: None,
            total_pages: None,
            toner_level_pct: None,
            toner_status: None,
            drum_level_pct: None,
            device_status: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_creates_once() {
        let dir = tempdir().unwrap();
        let registry = test_registry(&dir);

        let mut obs = observation("192.0.2.10", ConnectionStatus::Connected);
        let first = registry.resolve(&obs).await.unwrap();
        assert_eq!(first.name, "Printer at 192.0.2.10");
        assert_eq!(first.status, ConnectionStatus::Connected);
        assert!(first.last_seen_at.is_some());

        // Second resolve with different observed attributes updates in place.
        obs.model = Some("LaserJet 4100".to_string());
        obs.ts = Utc::now();
        let second = registry.resolve(&obs).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.model.as_deref(), Some("LaserJet 4100"));
    }

    #[tokio::test]
    async fn test_resolve_idempotent_no_duplicates() {
        let dir = tempdir().unwrap();
        let registry = test_registry(&dir);

        for _ in 0..3 {
            registry
                .resolve(&observation("192.0.2.10", ConnectionStatus::Connected))
                .await
                .unwrap();
        }

        let count = registry
            .backend
            .local_store()
            .printer_count()
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_offline_keeps_last_seen() {
        let dir = tempdir().unwrap();
        let registry = test_registry(&dir);

        let connected = observation("192.0.2.10", ConnectionStatus::Connected);
        let first = registry.resolve(&connected).await.unwrap();
        let seen = first.last_seen_at.unwrap();

        let offline = observation("192.0.2.10", ConnectionStatus::Offline);
        registry.resolve(&offline).await.unwrap();

        let stored = registry
            .backend
            .local_store()
            .get_by_address("192.0.2.10")
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ConnectionStatus::Offline);
        assert_eq!(
            stored.last_seen_at.unwrap().timestamp_micros(),
            seen.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_device_name_fills_placeholder_only() {
        let dir = tempdir().unwrap();
        let registry = test_registry(&dir);

        let mut obs = observation("192.0.2.10", ConnectionStatus::Connected);
        obs.name = Some("NPI1A2B3C".to_string());
        let printer = registry.resolve(&obs).await.unwrap();
        assert_eq!(printer.name, "NPI1A2B3C");

        // A later device-reported name does not clobber the resolved one.
        obs.name = Some("other".to_string());
        let printer = registry.resolve(&obs).await.unwrap();
        assert_eq!(printer.name, "NPI1A2B3C");
    }
}
