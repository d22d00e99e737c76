//! Delivery backend contract.
//!
//! A backend delivers one alert record through some channel (email, webhook,
//! ...). `send` must either complete its side effect or fail with
//! `DeliveryError`; the dispatcher may retry a failed record on a later sweep,
//! so a backend that can end up in an ambiguous state must be idempotent.

use async_trait::async_trait;

use relay_common::error::DeliveryError;
use relay_common::types::AlertRecord;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Registry key. Defaults to the implementing type's name.
    fn id(&self) -> String {
        type_name_id::<Self>()
    }

    /// Display name.
    fn title(&self) -> String {
        self.id()
    }

    /// Deliver a single record.
    async fn send(&self, record: &AlertRecord) -> Result<(), DeliveryError>;

    /// Deliver a batch. Each member is sent independently; a failure in one
    /// does not affect the others.
    async fn notify(&self, records: &[AlertRecord]) -> Vec<Result<(), DeliveryError>> {
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            results.push(self.send(record).await);
        }
        results
    }
}

/// Canonical id for a type: its bare name without module path or generics.
///
/// `relay_notifier::email::EmailBackend` becomes `EmailBackend`.
pub fn type_name_id<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .to_string()
}
