//! In-memory alert and preference stores.
//!
//! These implement the same claim semantics as the PostgreSQL stores and are
//! what the dispatcher's tests and the concurrency harness run against.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use relay_common::error::StoreError;
use relay_common::types::{AlertRecord, DeliveryOutcome, NewAlertRecord};

use crate::preferences::PreferenceStore;
use crate::store::{AlertStore, Claim, ClaimToken, lease_deadline};

/// `(event_id, alert_type_id, backend_id, recipient_id)`
type NaturalKey = (Uuid, String, String, Uuid);

fn natural_key(new: &NewAlertRecord) -> NaturalKey {
    let (event_id, alert_type_id, backend_id, recipient_id) = new.natural_key();
    (event_id, alert_type_id.to_string(), backend_id.to_string(), recipient_id)
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<Uuid, AlertRecord>,
    /// Creation order.
    order: Vec<Uuid>,
    /// Every natural key ever inserted.
    keys: HashSet<NaturalKey>,
}

/// Alert store backed by a `Mutex<HashMap>`.
///
/// Every operation takes the mutex for its whole read-modify-write, so a
/// claim is a single-row compare-and-swap just like the SQL version.
#[derive(Default)]
pub struct InMemoryAlertStore {
    state: Mutex<MemoryState>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    /// Number of records, sent or not.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.order.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn insert_batch(&self, records: Vec<NewAlertRecord>) -> Result<Vec<AlertRecord>, StoreError> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let mut created = Vec::with_capacity(records.len());

        for new in records {
            if !state.keys.insert(natural_key(&new)) {
                continue;
            }
            created.push(AlertRecord::from_new(new, now));
        }

        for record in &created {
            state.order.push(record.id);
            state.records.insert(record.id, record.clone());
        }
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<AlertRecord, StoreError> {
        self.lock()?
            .records
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn pending(&self) -> Result<Vec<AlertRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .filter(|r| r.is_pending())
            .cloned()
            .collect())
    }

    async fn pending_count(&self) -> Result<u64, StoreError> {
        let state = self.lock()?;
        Ok(state.records.values().filter(|r| r.is_pending()).count() as u64)
    }

    async fn list_for_recipient(&self, recipient_id: Uuid) -> Result<Vec<AlertRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .filter(|r| r.recipient_id == recipient_id)
            .cloned()
            .collect())
    }

    async fn try_claim(&self, id: Uuid, lease: Duration) -> Result<Claim, StoreError> {
        let mut state = self.lock()?;
        let record = state.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let now = Utc::now();

        if record.is_sent {
            return Ok(Claim::AlreadySent);
        }
        if record.is_locked_at(now) {
            return Ok(Claim::Busy);
        }

        let token = ClaimToken::new(id);
        record.begin_attempt(token.owner, now, lease_deadline(now, lease));
        Ok(Claim::Acquired {
            token,
            record: record.clone(),
        })
    }

    async fn complete(
        &self,
        token: &ClaimToken,
        outcome: &DeliveryOutcome,
    ) -> Result<AlertRecord, StoreError> {
        let mut state = self.lock()?;
        let record = state
            .records
            .get_mut(&token.record_id)
            .ok_or(StoreError::NotFound(token.record_id))?;

        if record.lock_owner != Some(token.owner) {
            return Err(StoreError::ClaimLost(token.record_id));
        }
        record.finish_attempt(outcome);
        Ok(record.clone())
    }

    async fn release(&self, token: &ClaimToken) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(record) = state.records.get_mut(&token.record_id)
            && record.lock_owner == Some(token.owner)
        {
            record.release_claim();
        }
        Ok(())
    }
}

/// Preference store backed by a `Mutex<HashMap>`.
#[derive(Default)]
pub struct InMemoryPreferenceStore {
    preferences: Mutex<HashMap<(Uuid, String), bool>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn preference(&self, recipient_id: Uuid, alert_type_id: &str) -> Result<Option<bool>, StoreError> {
        let preferences = self
            .preferences
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(preferences
            .get(&(recipient_id, alert_type_id.to_string()))
            .copied())
    }

    async fn set_preference(
        &self,
        recipient_id: Uuid,
        alert_type_id: &str,
        enabled: bool,
    ) -> Result<(), StoreError> {
        self.preferences
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?
            .insert((recipient_id, alert_type_id.to_string()), enabled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(event_id: Uuid, backend: &str, recipient_id: Uuid) -> NewAlertRecord {
        NewAlertRecord {
            event_id,
            alert_type_id: "WelcomeAlert".to_string(),
            backend_id: backend.to_string(),
            recipient_id,
            recipient_email: Some("user@example.com".to_string()),
            title: "Welcome".to_string(),
            body: "Hello there".to_string(),
        }
    }

    async fn store_with_one() -> (InMemoryAlertStore, AlertRecord) {
        let store = InMemoryAlertStore::new();
        let created = store
            .insert_batch(vec![new_record(Uuid::new_v4(), "EmailBackend", Uuid::new_v4())])
            .await
            .unwrap();
        let record = created.into_iter().next().unwrap();
        (store, record)
    }

    #[tokio::test]
    async fn test_insert_batch_skips_replayed_natural_keys() {
        let store = InMemoryAlertStore::new();
        let event_id = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let batch = vec![
            new_record(event_id, "EmailBackend", recipient),
            new_record(event_id, "DummyBackend", recipient),
            new_record(event_id, "DummyBackend", recipient),
        ];

        let created = store.insert_batch(batch.clone()).await.unwrap();
        assert_eq!(created.len(), 2);

        let replayed = store.insert_batch(batch).await.unwrap();
        assert!(replayed.is_empty());
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_natural_key_index_tracks_inserts() {
        let store = InMemoryAlertStore::new();
        let recipient = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store
            .insert_batch(vec![
                new_record(first, "EmailBackend", recipient),
                new_record(first, "EmailBackend", recipient),
            ])
            .await
            .unwrap();
        let created = store
            .insert_batch(vec![
                new_record(first, "EmailBackend", recipient),
                new_record(second, "EmailBackend", recipient),
            ])
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].event_id, second);
        let state = store.lock().unwrap();
        assert_eq!(state.keys.len(), 2);
        assert_eq!(state.records.len(), 2);
        assert!(state.keys.contains(&(second, "WelcomeAlert".to_string(), "EmailBackend".to_string(), recipient)));
    }

    #[tokio::test]
    async fn test_pending_preserves_creation_order() {
        let store = InMemoryAlertStore::new();
        let recipient = Uuid::new_v4();
        for backend in ["A", "B", "C"] {
            store
                .insert_batch(vec![new_record(Uuid::new_v4(), backend, recipient)])
                .await
                .unwrap();
        }

        let backends: Vec<_> = store
            .pending()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.backend_id)
            .collect();
        assert_eq!(backends, vec!["A", "B", "C"]);
        assert_eq!(store.list_for_recipient(recipient).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_second_claim_is_busy() {
        let (store, record) = store_with_one().await;

        let first = store.try_claim(record.id, Duration::from_secs(60)).await.unwrap();
        assert!(matches!(first, Claim::Acquired { .. }));

        let second = store.try_claim(record.id, Duration::from_secs(60)).await.unwrap();
        assert_eq!(second, Claim::Busy);
    }

    #[tokio::test]
    async fn test_claim_stamps_last_attempt() {
        let (store, record) = store_with_one().await;
        let before = Utc::now();

        let Claim::Acquired { record: claimed, .. } =
            store.try_claim(record.id, Duration::from_secs(60)).await.unwrap()
        else {
            panic!("expected to acquire the claim");
        };

        let attempted = claimed.last_attempt_at.unwrap();
        assert!(attempted >= before);
        assert!(claimed.locked_until.unwrap() > attempted);
    }

    #[tokio::test]
    async fn test_expired_lease_is_claimable() {
        let (store, record) = store_with_one().await;

        let Claim::Acquired { token: stale, .. } =
            store.try_claim(record.id, Duration::ZERO).await.unwrap()
        else {
            panic!("expected to acquire the claim");
        };

        let fresh = store.try_claim(record.id, Duration::from_secs(60)).await.unwrap();
        let Claim::Acquired { token: fresh, .. } = fresh else {
            panic!("expired lease should be claimable");
        };
        assert_ne!(stale.owner, fresh.owner);

        let err = store
            .complete(&stale, &DeliveryOutcome::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ClaimLost(id) if id == record.id));

        let done = store.complete(&fresh, &DeliveryOutcome::Delivered).await.unwrap();
        assert!(done.is_sent);
        assert_eq!(done.attempts, 1);
    }

    #[tokio::test]
    async fn test_sent_record_reports_already_sent() {
        let (store, record) = store_with_one().await;

        let Claim::Acquired { token, .. } =
            store.try_claim(record.id, Duration::from_secs(60)).await.unwrap()
        else {
            panic!("expected to acquire the claim");
        };
        store.complete(&token, &DeliveryOutcome::Delivered).await.unwrap();

        let again = store.try_claim(record.id, Duration::from_secs(60)).await.unwrap();
        assert_eq!(again, Claim::AlreadySent);
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_outcome_keeps_record_pending() {
        let (store, record) = store_with_one().await;

        let Claim::Acquired { token, .. } =
            store.try_claim(record.id, Duration::from_secs(60)).await.unwrap()
        else {
            panic!("expected to acquire the claim");
        };
        let failed = store
            .complete(&token, &DeliveryOutcome::Failed("no mailbox".into()))
            .await
            .unwrap();

        assert!(failed.failed);
        assert!(!failed.is_sent);
        assert!(failed.lock_owner.is_none());
        assert_eq!(store.pending_count().await.unwrap(), 1);
        assert!(matches!(
            store.try_claim(record.id, Duration::from_secs(60)).await.unwrap(),
            Claim::Acquired { .. }
        ));
    }

    #[tokio::test]
    async fn test_release_only_by_owner() {
        let (store, record) = store_with_one().await;

        let Claim::Acquired { token, .. } =
            store.try_claim(record.id, Duration::from_secs(60)).await.unwrap()
        else {
            panic!("expected to acquire the claim");
        };

        let stranger = ClaimToken::new(record.id);
        store.release(&stranger).await.unwrap();
        assert!(store.get(record.id).await.unwrap().lock_owner.is_some());

        store.release(&token).await.unwrap();
        let released = store.get(record.id).await.unwrap();
        assert!(released.lock_owner.is_none());
        assert_eq!(released.attempts, 0);
    }

    #[tokio::test]
    async fn test_unknown_record() {
        let store = InMemoryAlertStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.try_claim(id, Duration::from_secs(1)).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_preferences_round_trip() {
        let prefs = InMemoryPreferenceStore::new();
        let recipient = Uuid::new_v4();

        assert_eq!(prefs.preference(recipient, "WelcomeAlert").await.unwrap(), None);
        prefs.set_preference(recipient, "WelcomeAlert", false).await.unwrap();
        assert_eq!(
            prefs.preference(recipient, "WelcomeAlert").await.unwrap(),
            Some(false)
        );
        assert_eq!(prefs.preference(recipient, "Other").await.unwrap(), None);
    }
}
