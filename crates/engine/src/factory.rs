//! Alert factory.
//!
//! Turns a triggering event into pending alert records:
//! 1. Find the alert types subscribed to the event's type
//! 2. Skip types whose `is_applicable` rejects the event
//! 3. For each distinct recipient who has not opted out, render content per
//!    targeted backend
//! 4. Persist all records for the event in one batch

use std::collections::HashSet;
use std::sync::Arc;

use relay_common::error::AppError;
use relay_common::types::{AlertRecord, NewAlertRecord, TriggerEvent};

use crate::alert_type::AlertType;
use crate::preferences::PreferenceStore;
use crate::registry::{AlertTypeRegistry, BackendRegistry};
use crate::store::AlertStore;

#[derive(Clone)]
pub struct AlertFactory {
    alert_types: Arc<AlertTypeRegistry>,
    backends: Arc<BackendRegistry>,
    store: Arc<dyn AlertStore>,
    preferences: Arc<dyn PreferenceStore>,
}

impl AlertFactory {
    pub fn new(
        alert_types: Arc<AlertTypeRegistry>,
        backends: Arc<BackendRegistry>,
        store: Arc<dyn AlertStore>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            alert_types,
            backends,
            store,
            preferences,
        }
    }

    /// Evaluate every alert type subscribed to `event.event_type` and persist
    /// the resulting records in one batch. Returns the records created;
    /// replaying an event creates nothing new.
    pub async fn handle_event(&self, event: &TriggerEvent) -> Result<Vec<AlertRecord>, AppError> {
        let mut batch = Vec::new();
        for alert_type in self.alert_types.subscribed_to(&event.event_type) {
            batch.extend(self.plan_for(alert_type.as_ref(), event).await?);
        }

        self.persist(event, batch).await
    }

    /// Materialize records for a single alert type.
    pub async fn materialize(
        &self,
        alert_type_id: &str,
        event: &TriggerEvent,
    ) -> Result<Vec<AlertRecord>, AppError> {
        let batch = self.plan(alert_type_id, event).await?;
        self.persist(event, batch).await
    }

    /// Compute the records an alert type would create for `event` without
    /// persisting them. Used to bind creation to a caller's own transaction
    /// (see `PgAlertStore::insert_in`).
    pub async fn plan(
        &self,
        alert_type_id: &str,
        event: &TriggerEvent,
    ) -> Result<Vec<NewAlertRecord>, AppError> {
        let alert_type = self.alert_types.get(alert_type_id)?;
        self.plan_for(alert_type.as_ref(), event).await
    }

    async fn plan_for(
        &self,
        alert_type: &dyn AlertType,
        event: &TriggerEvent,
    ) -> Result<Vec<NewAlertRecord>, AppError> {
        let info = alert_type.info();

        if !alert_type.is_applicable(event) {
            tracing::debug!(
                alert_type_id = %info.id,
                event_id = %event.id,
                "Alert type not applicable to event"
            );
            return Ok(Vec::new());
        }

        let backend_ids = self.target_backends(alert_type)?;

        let mut seen = HashSet::new();
        let mut planned = Vec::new();

        for recipient in alert_type.recipients_for(event) {
            if !seen.insert(recipient.id) {
                continue;
            }

            if !self.preferences.is_enabled(recipient.id, info).await? {
                tracing::debug!(
                    alert_type_id = %info.id,
                    recipient_id = %recipient.id,
                    "Recipient opted out, no alert created"
                );
                continue;
            }

            for backend_id in &backend_ids {
                let content = alert_type.render(&recipient, event, backend_id);
                planned.push(NewAlertRecord {
                    event_id: event.id,
                    alert_type_id: info.id.clone(),
                    backend_id: backend_id.clone(),
                    recipient_id: recipient.id,
                    recipient_email: recipient.email.clone(),
                    title: content.title,
                    body: content.body,
                });
            }
        }

        Ok(planned)
    }

    /// Explicit targets must all be registered; no targets means every backend.
    fn target_backends(&self, alert_type: &dyn AlertType) -> Result<Vec<String>, AppError> {
        match &alert_type.info().target_backends {
            Some(ids) => {
                for id in ids {
                    self.backends.get(id)?;
                }
                Ok(ids.clone())
            }
            None => Ok(self.backends.ids().map(str::to_string).collect()),
        }
    }

    async fn persist(
        &self,
        event: &TriggerEvent,
        batch: Vec<NewAlertRecord>,
    ) -> Result<Vec<AlertRecord>, AppError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let planned = batch.len();
        let created = self.store.insert_batch(batch).await?;

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            planned,
            created = created.len(),
            "Alert records created"
        );

        Ok(created)
    }
}
