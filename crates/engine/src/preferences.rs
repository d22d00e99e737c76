//! Per-recipient, per-alert-type opt-in/opt-out.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use relay_common::error::StoreError;

use crate::alert_type::AlertTypeInfo;

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// The recipient's explicit choice, if they ever made one.
    async fn preference(&self, recipient_id: Uuid, alert_type_id: &str) -> Result<Option<bool>, StoreError>;

    async fn set_preference(
        &self,
        recipient_id: Uuid,
        alert_type_id: &str,
        enabled: bool,
    ) -> Result<(), StoreError>;

    /// Opt the recipient out of every listed alert type.
    async fn unsubscribe_all(&self, recipient_id: Uuid, alert_type_ids: &[String]) -> Result<(), StoreError> {
        for alert_type_id in alert_type_ids {
            self.set_preference(recipient_id, alert_type_id, false).await?;
        }
        Ok(())
    }

    /// Explicit preference, falling back to the alert type's default.
    async fn is_enabled(&self, recipient_id: Uuid, info: &AlertTypeInfo) -> Result<bool, StoreError> {
        Ok(self
            .preference(recipient_id, &info.id)
            .await?
            .unwrap_or(info.default_enabled))
    }
}

/// Preferences stored in the `alert_preferences` table.
#[derive(Clone)]
pub struct PgPreferenceStore {
    pool: PgPool,
}

impl PgPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn preference(&self, recipient_id: Uuid, alert_type_id: &str) -> Result<Option<bool>, StoreError> {
        let row: Option<(bool,)> = sqlx::query_as(
            "SELECT enabled FROM alert_preferences WHERE recipient_id = $1 AND alert_type_id = $2",
        )
        .bind(recipient_id)
        .bind(alert_type_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(enabled,)| enabled))
    }

    async fn set_preference(
        &self,
        recipient_id: Uuid,
        alert_type_id: &str,
        enabled: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO alert_preferences (recipient_id, alert_type_id, enabled, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (recipient_id, alert_type_id)
            DO UPDATE SET enabled = EXCLUDED.enabled, updated_at = now()
            "#,
        )
        .bind(recipient_id)
        .bind(alert_type_id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            recipient_id = %recipient_id,
            alert_type_id,
            enabled,
            "Alert preference updated"
        );
        Ok(())
    }

    async fn unsubscribe_all(&self, recipient_id: Uuid, alert_type_ids: &[String]) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO alert_preferences (recipient_id, alert_type_id, enabled, updated_at)
            SELECT $1, alert_type_id, false, now()
            FROM UNNEST($2::text[]) AS t(alert_type_id)
            ON CONFLICT (recipient_id, alert_type_id)
            DO UPDATE SET enabled = false, updated_at = now()
            "#,
        )
        .bind(recipient_id)
        .bind(alert_type_ids)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            recipient_id = %recipient_id,
            alert_types = alert_type_ids.len(),
            "Recipient unsubscribed from all alerts"
        );
        Ok(())
    }
}
