//! Polling scheduler.
//!
//! One explicit loop: enumerate targets, poll each printer in sequence,
//! resolve its identity, record the sample, then sleep until the next
//! cycle. Cancellation is observed between printer polls, so shutdown
//! latency is bounded by one device poll budget rather than a full cycle
//! or sleep interval. One printer's failure never aborts the cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::collector::SnmpCollector;
use crate::config::MonitorConfig;
use crate::health::AgentHealth;
use crate::registry::PrinterRegistry;
use crate::storage::{ConnectionStatus, StorageBackend, WriteOutcome};

/// Counters from one polling cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Printers polled this cycle.
    pub polled: u64,
    /// Devices that answered with decodable metrics.
    pub connected: u64,
    /// Devices that did not answer.
    pub offline: u64,
    /// Samples handed to the backend (stored or deferred).
    pub recorded: u64,
    /// Samples buffered for deferred delivery.
    pub deferred: u64,
}

/// Drives polling cycles at a fixed interval with optional jitter.
pub struct Scheduler {
    monitor: MonitorConfig,
    collector: SnmpCollector,
    registry: PrinterRegistry,
    backend: Arc<StorageBackend>,
    health: Arc<AgentHealth>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler over the wired components.
    pub fn new(
        monitor: MonitorConfig,
        collector: SnmpCollector,
        registry: PrinterRegistry,
        backend: Arc<StorageBackend>,
        health: Arc<AgentHealth>,
    ) -> Self {
        Self {
            monitor,
            collector,
            registry,
            backend,
            health,
        }
    }

    /// Run polling cycles until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(interval = ?self.monitor.interval, "Scheduler started");
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            let report = self.run_cycle(&cancel).await;
            if cancel.is_cancelled() {
                break;
            }

            self.health.record_cycle(Utc::now());
            tracing::info!(
                cycle,
                polled = report.polled,
                connected = report.connected,
                offline = report.offline,
                recorded = report.recorded,
                deferred = report.deferred,
                "Polling cycle complete"
            );

            let wait = self.monitor.interval + cycle_jitter(self.monitor.jitter, cycle);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Run one polling cycle.
    ///
    /// Exposed so tests can drive cycles deterministically.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();

        if self.monitor.discover {
            if let Err(e) = self.backend.refresh_targets().await {
                tracing::warn!(error = %e, "Target refresh failed");
            }
        }

        let targets = match self.backend.local_store().list_printers() {
            Ok(targets) => targets,
            Err(e) => {
                tracing::error!(error = %e, "Failed to enumerate targets");
                return report;
            }
        };

        for target in targets {
            if cancel.is_cancelled() {
                tracing::info!("Cycle interrupted by shutdown");
                break;
            }

            let obs = self.collector.poll(&target.address).await;
            report.polled += 1;
            match obs.status {
                ConnectionStatus::Connected => report.connected += 1,
                ConnectionStatus::Offline => report.offline += 1,
                ConnectionStatus::Error => {}
            }

            let printer = match self.registry.resolve(&obs).await {
                Ok(printer) => printer,
                Err(e) => {
                    tracing::error!(address = %obs.address, error = %e, "Identity resolution failed");
                    self.health.set_degraded();
                    continue;
                }
            };

            if !obs.has_sample() {
                continue;
            }

            match self.backend.record_metric(&printer, &obs).await {
                Ok(WriteOutcome::Stored) => report.recorded += 1,
                Ok(WriteOutcome::Deferred(_)) => {
                    report.recorded += 1;
                    report.deferred += 1;
                }
                Ok(WriteOutcome::Dropped) => {}
                Err(e) => {
                    // Local durability failure: fatal for this write only.
                    tracing::error!(address = %printer.address, error = %e, "Metric write failed");
                    self.health.set_degraded();
                }
            }
        }

        report
    }
}

/// Deterministic per-cycle jitter in `[0, max)`, spreading agent fleets
/// without a random-number dependency.
fn cycle_jitter(max: Duration, cycle: u64) -> Duration {
    let max_ms = max.as_millis().min(u128::from(u64::MAX)) as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let hash = cycle.wrapping_mul(6364136223846793005);
    Duration::from_millis(hash % max_ms)
}
