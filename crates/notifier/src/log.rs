use async_trait::async_trait;

use relay_common::error::DeliveryError;
use relay_common::types::AlertRecord;
use relay_engine::backend::Backend;

/// Writes alerts to the structured log instead of delivering them.
/// Registered when no real transport is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBackend;

#[async_trait]
impl Backend for LogBackend {
    fn title(&self) -> String {
        "Log".to_string()
    }

    async fn send(&self, record: &AlertRecord) -> Result<(), DeliveryError> {
        tracing::info!(
            record_id = %record.id,
            alert_type_id = %record.alert_type_id,
            recipient_id = %record.recipient_id,
            title = %record.title,
            body = %record.body,
            "Alert"
        );
        Ok(())
    }
}
