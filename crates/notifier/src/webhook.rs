//! Discord-compatible webhook delivery.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use relay_common::error::DeliveryError;
use relay_common::types::AlertRecord;
use relay_engine::backend::Backend;

/// Discord rejects message content longer than this.
const MAX_CONTENT_CHARS: usize = 2000;

/// Posts `{"content": ...}` to a webhook URL.
///
/// There is one webhook per backend, not per recipient: every alert routed
/// here lands in the same shared channel, whoever it was rendered for. Alert
/// types with personal content should list their backends explicitly
/// (`AlertTypeInfo::with_backends`) and leave this one out.
pub struct WebhookBackend {
    client: reqwest::Client,
    url: String,
    id: Option<String>,
    timeout: Duration,
}

impl WebhookBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            id: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Register under a custom id, e.g. to run two webhooks side by side.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn content(record: &AlertRecord) -> String {
    let full = format!("**{}**\n{}", record.title, record.body);
    if full.chars().count() <= MAX_CONTENT_CHARS {
        return full;
    }
    let mut truncated: String = full.chars().take(MAX_CONTENT_CHARS - 1).collect();
    truncated.push('…');
    truncated
}

#[async_trait]
impl Backend for WebhookBackend {
    fn id(&self) -> String {
        self.id.clone().unwrap_or_else(|| "WebhookBackend".to_string())
    }

    fn title(&self) -> String {
        "Discord webhook".to_string()
    }

    async fn send(&self, record: &AlertRecord) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&json!({ "content": content(record) }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(record_id = %record.id, error = %e, "HTTP request to webhook failed");
                anyhow::Error::from(e).context("webhook request failed")
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(record_id = %record.id, status = %status, body = %text, "Webhook rejected alert");
            return Err(DeliveryError::CouldNotDeliver(format!(
                "webhook returned HTTP {}",
                status
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relay_common::types::NewAlertRecord;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(title: &str, body: &str) -> AlertRecord {
        AlertRecord::from_new(
            NewAlertRecord {
                event_id: Uuid::new_v4(),
                alert_type_id: "WelcomeAlert".to_string(),
                backend_id: "WebhookBackend".to_string(),
                recipient_id: Uuid::new_v4(),
                recipient_email: None,
                title: title.to_string(),
                body: body.to_string(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_id_override() {
        assert_eq!(WebhookBackend::new("http://localhost").id(), "WebhookBackend");
        assert_eq!(
            WebhookBackend::new("http://localhost").with_id("ops-channel").id(),
            "ops-channel"
        );
    }

    #[test]
    fn test_long_content_is_truncated() {
        let short = content(&record("Hi", "there"));
        assert_eq!(short, "**Hi**\nthere");

        let long = content(&record("Hi", &"é".repeat(5000)));
        assert_eq!(long.chars().count(), MAX_CONTENT_CHARS);
        assert!(long.ends_with('…'));
    }

    #[tokio::test]
    async fn test_send_posts_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(json!({ "content": "**Welcome**\nThanks for joining" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let backend = WebhookBackend::new(format!("{}/hook", server.uri()));
        let result = backend.send(&record("Welcome", "Thanks for joining")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limited_is_not_deliverable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let backend = WebhookBackend::new(format!("{}/hook", server.uri()));
        let err = backend.send(&record("Welcome", "body")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::CouldNotDeliver(msg) if msg.contains("429")));
    }
}
