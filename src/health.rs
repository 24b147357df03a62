//! Agent health state shared between the scheduler, sync engine, and the
//! status endpoints.
//!
//! Counters are plain atomics updated from the two loops and read by the
//! HTTP handlers; none of them require cross-field consistency.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Shared health and progress counters.
#[derive(Debug, Default)]
pub struct AgentHealth {
    degraded: AtomicBool,
    last_cycle_at: AtomicI64,
    cycles_completed: AtomicU64,
    buffer_depth: AtomicU64,
    records_lost: AtomicU64,
    upstream_failures: AtomicU64,
}

/// Point-in-time view of [`AgentHealth`] for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// True after a local durability failure.
    pub degraded: bool,
    /// End time of the most recent polling cycle.
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// Number of completed polling cycles.
    pub cycles_completed: u64,
    /// Pending uploads in the delivery buffer.
    pub buffer_depth: u64,
    /// Records dropped without delivery (always logged, never silent).
    pub records_lost: u64,
    /// Consecutive upstream delivery failures.
    pub upstream_failures: u64,
}

impl AgentHealth {
    /// Create a fresh health state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the degraded flag (local durability failure).
    pub fn set_degraded(&self) {
        self.degraded.store(true, Ordering::Relaxed);
    }

    /// Whether a local durability failure has occurred.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Record the completion of a polling cycle.
    pub fn record_cycle(&self, at: DateTime<Utc>) {
        self.last_cycle_at
            .store(at.timestamp_micros(), Ordering::Relaxed);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish the current buffer depth.
    pub fn set_buffer_depth(&self, depth: u64) {
        self.buffer_depth.store(depth, Ordering::Relaxed);
    }

    /// Count records lost without delivery.
    pub fn record_loss(&self, count: u64) {
        self.records_lost.fetch_add(count, Ordering::Relaxed);
    }

    /// Total records lost without delivery.
    pub fn records_lost(&self) -> u64 {
        self.records_lost.load(Ordering::Relaxed)
    }

    /// Count one upstream delivery failure. Returns the current streak.
    pub fn record_upstream_failure(&self) -> u64 {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Reset the upstream failure streak after a successful delivery.
    pub fn reset_upstream_failures(&self) {
        self.upstream_failures.store(0, Ordering::Relaxed);
    }

    /// Snapshot all counters for the status API.
    pub fn snapshot(&self) -> HealthSnapshot {
        let last = self.last_cycle_at.load(Ordering::Relaxed);
        HealthSnapshot {
            degraded: self.degraded.load(Ordering::Relaxed),
            last_cycle_at: (last != 0).then(|| {
                DateTime::from_timestamp_micros(last).unwrap_or(DateTime::UNIX_EPOCH)
            }),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            buffer_depth: self.buffer_depth.load(Ordering::Relaxed),
            records_lost: self.records_lost.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
        }
    }
}
