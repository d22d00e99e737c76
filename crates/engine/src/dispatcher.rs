//! Dispatch engine.
//!
//! A sweep takes a snapshot of the pending set and walks it once. For each
//! record it:
//! 1. Resolves the record's backend (an unregistered backend is logged and
//!    skipped without claiming)
//! 2. Claims the record; a live lease held by another sweep means skip it
//! 3. Re-checks `is_sent` on the claimed row
//! 4. Sends, then records delivered/failed and releases the lease
//!
//! Sweeps hold no shared state beyond the store, so any number may run at
//! once, in one process or many. Delivery failures never abort a sweep.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use relay_common::error::{AppError, StoreError};
use relay_common::types::{AlertRecord, DeliveryOutcome};

use crate::registry::BackendRegistry;
use crate::store::{AlertStore, Claim};

/// Lease held on a record while its backend is sending.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(60);

/// Recorded as `last_error` when a send outlives its budget.
pub const SEND_TIMEOUT_ERROR: &str = "send exceeded claim lease";

/// Shortest tick `run` will schedule.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Per-sweep tallies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records in the pending snapshot.
    pub examined: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Claimed by another sweep.
    pub busy: usize,
    /// Delivered by another sweep after the snapshot was taken.
    pub already_sent: usize,
    /// Record names a backend this process never registered.
    pub misconfigured: usize,
    /// Store errors on individual records.
    pub errors: usize,
}

impl SweepReport {
    /// Attempts this sweep actually made.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }

    pub fn merge(&mut self, other: &SweepReport) {
        self.examined += other.examined;
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.busy += other.busy;
        self.already_sent += other.already_sent;
        self.misconfigured += other.misconfigured;
        self.errors += other.errors;
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn AlertStore>,
    backends: Arc<BackendRegistry>,
    worker_id: String,
    lease: Duration,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn AlertStore>, backends: Arc<BackendRegistry>) -> Self {
        Self {
            store,
            backends,
            worker_id: format!("dispatcher-{}", std::process::id()),
            lease: DEFAULT_LEASE,
        }
    }

    /// Set the worker id recorded in logs.
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set how long a claim survives a worker that never completes it.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// How long a backend may spend on one send: four fifths of the lease.
    pub fn send_budget(&self) -> Duration {
        self.lease - self.lease / 5
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run one sweep over the pending set.
    ///
    /// Only a failure to read the pending snapshot is returned as an error;
    /// everything that goes wrong with an individual record is counted in
    /// the report.
    #[tracing::instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn run_sweep(&self) -> Result<SweepReport, AppError> {
        let pending = self.store.pending().await?;
        let mut report = SweepReport {
            examined: pending.len(),
            ..Default::default()
        };

        for snapshot in &pending {
            self.dispatch_one(snapshot, &mut report).await;
        }

        if report.attempted() > 0 || report.misconfigured > 0 || report.errors > 0 {
            tracing::info!(
                examined = report.examined,
                delivered = report.delivered,
                failed = report.failed,
                busy = report.busy,
                already_sent = report.already_sent,
                misconfigured = report.misconfigured,
                errors = report.errors,
                "Dispatch sweep finished"
            );
        } else {
            tracing::debug!(examined = report.examined, "Dispatch sweep found nothing to do");
        }

        Ok(report)
    }

    async fn dispatch_one(&self, snapshot: &AlertRecord, report: &mut SweepReport) {
        let backend = match self.backends.get(&snapshot.backend_id) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::error!(
                    record_id = %snapshot.id,
                    alert_type_id = %snapshot.alert_type_id,
                    error = %e,
                    "Alert record references an unregistered backend"
                );
                report.misconfigured += 1;
                return;
            }
        };

        let (token, record) = match self.store.try_claim(snapshot.id, self.lease).await {
            Ok(Claim::Acquired { token, record }) => (token, record),
            Ok(Claim::Busy) => {
                tracing::debug!(record_id = %snapshot.id, "Alert record claimed elsewhere, skipping");
                report.busy += 1;
                return;
            }
            Ok(Claim::AlreadySent) => {
                report.already_sent += 1;
                return;
            }
            Err(e) => {
                tracing::error!(record_id = %snapshot.id, error = %e, "Failed to claim alert record");
                report.errors += 1;
                return;
            }
        };

        // The claim is the authority, not the snapshot.
        if record.is_sent {
            if let Err(e) = self.store.release(&token).await {
                tracing::warn!(record_id = %record.id, error = %e, "Failed to release claim");
            }
            report.already_sent += 1;
            return;
        }

        // Finish inside the lease, with room left to record the outcome.
        let budget = self.send_budget();
        let outcome = match tokio::time::timeout(budget, backend.send(&record)).await {
            Ok(Ok(())) => DeliveryOutcome::Delivered,
            Ok(Err(e)) => {
                tracing::warn!(
                    record_id = %record.id,
                    backend_id = %record.backend_id,
                    attempts = record.attempts + 1,
                    error = %e,
                    "Alert delivery failed, will retry on a later sweep"
                );
                DeliveryOutcome::Failed(e.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    record_id = %record.id,
                    backend_id = %record.backend_id,
                    attempts = record.attempts + 1,
                    budget_ms = budget.as_millis() as u64,
                    "Alert delivery timed out, will retry on a later sweep"
                );
                DeliveryOutcome::Failed(SEND_TIMEOUT_ERROR.to_string())
            }
        };

        match self.store.complete(&token, &outcome).await {
            Ok(done) => {
                if outcome.is_delivered() {
                    tracing::info!(
                        record_id = %done.id,
                        alert_type_id = %done.alert_type_id,
                        backend_id = %done.backend_id,
                        recipient_id = %done.recipient_id,
                        attempts = done.attempts,
                        "Alert delivered"
                    );
                    report.delivered += 1;
                } else {
                    report.failed += 1;
                }
            }
            Err(StoreError::ClaimLost(id)) => {
                tracing::warn!(
                    record_id = %id,
                    delivered = outcome.is_delivered(),
                    "Lease expired before the attempt was recorded"
                );
                report.errors += 1;
            }
            Err(e) => {
                tracing::error!(record_id = %record.id, error = %e, "Failed to record delivery outcome");
                report.errors += 1;
            }
        }
    }

    /// Sweep every `interval` until `shutdown` flips to `true` or its sender
    /// is dropped. A sweep already in progress runs to completion first, so
    /// no claim is abandoned mid-send. Sweep errors are logged and the loop
    /// carries on.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            worker_id = %self.worker_id,
            interval_ms = interval.as_millis() as u64,
            lease_secs = self.lease.as_secs(),
            "Dispatcher started"
        );

        let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_sweep().await {
                        tracing::error!(worker_id = %self.worker_id, error = %e, "Dispatch sweep failed");
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.worker_id, "Dispatcher stopped");
    }
}
