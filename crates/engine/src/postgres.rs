//! PostgreSQL alert store.
//!
//! Claims are a conditional `UPDATE ... RETURNING *` on a single row. The
//! row lock taken by the update serialises competing claimers: the loser
//! re-evaluates the `WHERE` clause after the winner commits, sees a live
//! `locked_until`, and gets no row back. No transaction is held open while a
//! backend is sending.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use relay_common::error::StoreError;
use relay_common::types::{AlertRecord, DeliveryOutcome, NewAlertRecord};

use crate::store::{AlertStore, Claim, ClaimToken};

#[derive(Clone)]
pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert records on a caller-supplied connection, typically the
    /// transaction that persists the triggering event itself.
    ///
    /// Rows whose natural key already exists are skipped.
    pub async fn insert_in(
        conn: &mut PgConnection,
        records: &[NewAlertRecord],
    ) -> Result<Vec<AlertRecord>, StoreError> {
        let mut created = Vec::with_capacity(records.len());

        for new in records {
            let row: Option<AlertRecord> = sqlx::query_as(
                r#"
                INSERT INTO alert_records
                    (id, event_id, alert_type_id, backend_id, recipient_id,
                     recipient_email, title, body)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT ON CONSTRAINT alert_records_natural_key DO NOTHING
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(new.event_id)
            .bind(&new.alert_type_id)
            .bind(&new.backend_id)
            .bind(new.recipient_id)
            .bind(&new.recipient_email)
            .bind(&new.title)
            .bind(&new.body)
            .fetch_optional(&mut *conn)
            .await?;

            match row {
                Some(record) => created.push(record),
                None => tracing::debug!(
                    event_id = %new.event_id,
                    alert_type_id = %new.alert_type_id,
                    backend_id = %new.backend_id,
                    recipient_id = %new.recipient_id,
                    "Alert record already exists, skipping"
                ),
            }
        }

        Ok(created)
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn insert_batch(&self, records: Vec<NewAlertRecord>) -> Result<Vec<AlertRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let created = Self::insert_in(&mut *tx, &records).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<AlertRecord, StoreError> {
        sqlx::query_as("SELECT * FROM alert_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn pending(&self) -> Result<Vec<AlertRecord>, StoreError> {
        let records = sqlx::query_as(
            "SELECT * FROM alert_records WHERE is_sent = FALSE ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn pending_count(&self) -> Result<u64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM alert_records WHERE is_sent = FALSE")
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }

    async fn list_for_recipient(&self, recipient_id: Uuid) -> Result<Vec<AlertRecord>, StoreError> {
        let records = sqlx::query_as(
            "SELECT * FROM alert_records WHERE recipient_id = $1 ORDER BY created_at, id",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn try_claim(&self, id: Uuid, lease: Duration) -> Result<Claim, StoreError> {
        let token = ClaimToken::new(id);

        let claimed: Option<AlertRecord> = sqlx::query_as(
            r#"
            UPDATE alert_records
            SET lock_owner = $2,
                locked_until = now() + make_interval(secs => $3),
                last_attempt_at = now()
            WHERE id = $1
              AND is_sent = FALSE
              AND (locked_until IS NULL OR locked_until <= now())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(token.owner)
        .bind(lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = claimed {
            return Ok(Claim::Acquired { token, record });
        }

        // Nothing updated: find out why.
        let state: Option<(bool,)> =
            sqlx::query_as("SELECT is_sent FROM alert_records WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match state {
            None => Err(StoreError::NotFound(id)),
            Some((true,)) => Ok(Claim::AlreadySent),
            Some((false,)) => Ok(Claim::Busy),
        }
    }

    async fn complete(
        &self,
        token: &ClaimToken,
        outcome: &DeliveryOutcome,
    ) -> Result<AlertRecord, StoreError> {
        let delivered = outcome.is_delivered();

        let record: Option<AlertRecord> = sqlx::query_as(
            r#"
            UPDATE alert_records
            SET is_sent = $3,
                failed = NOT $3,
                last_error = $4,
                attempts = attempts + 1,
                lock_owner = NULL,
                locked_until = NULL
            WHERE id = $1 AND lock_owner = $2
            RETURNING *
            "#,
        )
        .bind(token.record_id)
        .bind(token.owner)
        .bind(delivered)
        .bind(outcome.error())
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or(StoreError::ClaimLost(token.record_id))
    }

    async fn release(&self, token: &ClaimToken) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE alert_records
            SET lock_owner = NULL, locked_until = NULL
            WHERE id = $1 AND lock_owner = $2
            "#,
        )
        .bind(token.record_id)
        .bind(token.owner)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(record_id = %token.record_id, "Claim already gone on release");
        }
        Ok(())
    }
}
