//! Alert record storage and the claim primitive the dispatcher relies on.
//!
//! A claim is a lease on one row: `try_claim` either takes it (returning a
//! token and the freshly loaded record) or reports that someone else holds it.
//! Leases expire, so a worker that dies mid-send strands its record only until
//! `locked_until` passes.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use relay_common::error::StoreError;
use relay_common::types::{AlertRecord, DeliveryOutcome, NewAlertRecord};

/// Proof of ownership of one record for the duration of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimToken {
    pub record_id: Uuid,
    pub owner: Uuid,
}

impl ClaimToken {
    pub fn new(record_id: Uuid) -> Self {
        Self {
            record_id,
            owner: Uuid::new_v4(),
        }
    }
}

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The lease is ours. `record` reflects the row as of the claim.
    Acquired { token: ClaimToken, record: AlertRecord },
    /// Another worker holds a live lease.
    Busy,
    /// The record was delivered since it was queued.
    AlreadySent,
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Create records atomically. Records whose natural key already exists are
    /// skipped; only newly created rows are returned.
    async fn insert_batch(&self, records: Vec<NewAlertRecord>) -> Result<Vec<AlertRecord>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<AlertRecord, StoreError>;

    /// Snapshot of every record with `is_sent = false`, oldest first.
    async fn pending(&self) -> Result<Vec<AlertRecord>, StoreError>;

    async fn pending_count(&self) -> Result<u64, StoreError>;

    async fn list_for_recipient(&self, recipient_id: Uuid) -> Result<Vec<AlertRecord>, StoreError>;

    /// Take a lease of `lease` on one unsent record and stamp `last_attempt_at`.
    async fn try_claim(&self, id: Uuid, lease: Duration) -> Result<Claim, StoreError>;

    /// Record the attempt's outcome and drop the lease. Fails with
    /// `ClaimLost` if `token` no longer owns the record.
    async fn complete(
        &self,
        token: &ClaimToken,
        outcome: &DeliveryOutcome,
    ) -> Result<AlertRecord, StoreError>;

    /// Drop the lease without recording an attempt outcome.
    async fn release(&self, token: &ClaimToken) -> Result<(), StoreError>;
}

/// `now + lease`, saturating at the maximum representable time.
pub fn lease_deadline(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lease)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
