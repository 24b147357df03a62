//! Sync engine: drains the delivery buffer against the upstream service.
//!
//! Runs independently of the polling cadence. While a backlog exists and
//! the head record is due, records are delivered in strict FIFO order with
//! no inter-record delay; a retryable failure backs the engine off
//! exponentially, and an upstream Retry-After overrides the computed delay
//! verbatim. Records are never reordered, and are dropped only by the
//! explicit exhausted-attempts policy or on a permanent upstream rejection,
//! always with a logged, counted loss event.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::{ExhaustedPolicy, RetryConfig};
use crate::health::AgentHealth;
use crate::storage::{BufferStore, RemoteClient, StorageError};

/// How often the engine re-checks an empty queue.
const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(15);

/// Exponent cap; beyond this the delay is pinned to `max_delay` anyway.
const MAX_BACKOFF_EXP: u32 = 20;

/// Compute the delay before retry attempt `attempts + 1`.
///
/// `attempts` is the number of failed attempts so far: the first retry
/// waits `base_delay`, each subsequent retry doubles, capped at
/// `max_delay`. Monotonically non-decreasing in `attempts`.
pub fn backoff_delay(retry: &RetryConfig, attempts: u32) -> Duration {
    let exp = attempts.saturating_sub(1).min(MAX_BACKOFF_EXP);
    let base_ms = retry.base_delay.as_millis().min(u128::from(u64::MAX)) as u64;
    let delay_ms = base_ms.saturating_mul(1u64 << exp);
    Duration::from_millis(delay_ms).min(retry.max_delay)
}

/// Outcome of one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Records delivered and acknowledged.
    pub delivered: u64,
    /// Records dropped (rejection or exhausted-drop policy).
    pub dropped: u64,
    /// Imposed wait before the next attempt, if the pass hit a failure or
    /// an active rate-limit window.
    pub backoff: Option<Duration>,
}

/// Drains the buffer store against the upstream service.
pub struct SyncEngine {
    buffer: BufferStore,
    client: RemoteClient,
    retry: RetryConfig,
    health: Arc<AgentHealth>,
    idle_interval: Duration,
    /// Server-directed rate-limit window; in-memory only, the persisted
    /// attempt backoff still applies after a restart.
    rate_limit_until: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create a sync engine over the buffer and upstream client.
    pub fn new(
        buffer: BufferStore,
        client: RemoteClient,
        retry: RetryConfig,
        health: Arc<AgentHealth>,
    ) -> Self {
        Self {
            buffer,
            client,
            retry,
            health,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            rate_limit_until: None,
        }
    }

    /// Override the idle re-check interval.
    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Run the drain loop until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(idle = ?self.idle_interval, "Sync engine started");

        loop {
            let wait = match self.drain_once().await {
                Ok(report) => {
                    if report.delivered > 0 {
                        tracing::info!(delivered = report.delivered, "Backlog drained");
                    }
                    report.backoff.unwrap_or(self.idle_interval)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Sync engine storage error");
                    self.idle_interval
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        tracing::info!("Sync engine stopped");
    }

    /// One drain pass: deliver due records from the head of the queue until
    /// it is empty or a failure imposes a wait.
    ///
    /// Exposed so tests can drive the engine deterministically.
    pub async fn drain_once(&mut self) -> Result<DrainReport, StorageError> {
        let mut report = DrainReport::default();

        loop {
            let now = Utc::now();

            if let Some(until) = self.rate_limit_until {
                if now < until {
                    report.backoff = Some(remaining(now, until));
                    return Ok(report);
                }
                self.rate_limit_until = None;
            }

            let Some(record) = self.buffer.peek_oldest()? else {
                self.health.set_buffer_depth(0);
                return Ok(report);
            };

            // Backoff gate from persisted attempt state.
            if record.attempts > 0 {
                if let Some(last) = record.last_attempt_at {
                    let due = last + to_chrono(backoff_delay(&self.retry, record.attempts));
                    if now < due {
                        report.backoff = Some(remaining(now, due));
                        return Ok(report);
                    }
                }
            }

            match self.client.deliver(&record.payload).await {
                Ok(()) => {
                    self.buffer.acknowledge(record.seq)?;
                    self.health.reset_upstream_failures();
                    self.health.set_buffer_depth(self.buffer.depth()?);
                    report.delivered += 1;
                    tracing::debug!(
                        seq = record.seq,
                        kind = record.payload.kind(),
                        "Buffered upload delivered"
                    );
                }
                Err(e) if e.is_retryable() => {
                    let attempts = self.buffer.mark_attempt(record.seq)?;
                    let streak = self.health.record_upstream_failure();

                    let exhausted = self
                        .retry
                        .max_attempts
                        .is_some_and(|cap| attempts >= cap);

                    if exhausted && self.retry.on_exhausted == ExhaustedPolicy::Drop {
                        self.buffer.drop_record(record.seq)?;
                        self.health.record_loss(1);
                        self.health.set_buffer_depth(self.buffer.depth()?);
                        report.dropped += 1;
                        tracing::error!(
                            seq = record.seq,
                            attempts,
                            kind = record.payload.kind(),
                            address = %record.payload.address(),
                            "Attempt cap exhausted, record dropped"
                        );
                        continue;
                    }

                    let delay = if let Some(after) = e.retry_after() {
                        self.rate_limit_until = Some(now + to_chrono(after));
                        tracing::warn!(
                            seq = record.seq,
                            retry_after_s = after.as_secs(),
                            "Upstream rate limit, honoring server delay"
                        );
                        after
                    } else if exhausted {
                        tracing::warn!(
                            seq = record.seq,
                            attempts,
                            "Attempt cap exhausted, holding record at max delay"
                        );
                        self.retry.max_delay
                    } else {
                        backoff_delay(&self.retry, attempts)
                    };

                    tracing::warn!(
                        seq = record.seq,
                        attempts,
                        failures = streak,
                        delay_s = delay.as_secs(),
                        error = %e,
                        "Delivery failed, backing off"
                    );
                    report.backoff = Some(delay);
                    return Ok(report);
                }
                Err(e) => {
                    // Permanent rejection: a retry would reproduce the failure.
                    self.buffer.drop_record(record.seq)?;
                    self.health.record_loss(1);
                    self.health.set_buffer_depth(self.buffer.depth()?);
                    report.dropped += 1;
                    tracing::error!(
                        seq = record.seq,
                        kind = record.payload.kind(),
                        address = %record.payload.address(),
                        error = %e,
                        "Upload rejected by upstream, dropped from buffer"
                    );
                }
            }
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1_000))
}

fn remaining(now: DateTime<Utc>, until: DateTime<Utc>) -> Duration {
    (until - now).to_std().unwrap_or(Duration::ZERO)
}
