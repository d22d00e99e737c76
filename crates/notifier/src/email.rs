//! Email delivery through the Resend HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use relay_common::error::DeliveryError;
use relay_common::types::AlertRecord;
use relay_engine::backend::Backend;

pub const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, Serialize, PartialEq)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

/// Sends each alert as a plain-text email to the recipient's address.
pub struct EmailBackend {
    client: reqwest::Client,
    api_key: String,
    from: String,
    endpoint: String,
    timeout: Duration,
}

impl EmailBackend {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            from: from.into(),
            endpoint: RESEND_ENDPOINT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Point the backend at a different Resend-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn payload<'a>(&'a self, to: &'a str, record: &'a AlertRecord) -> ResendEmail<'a> {
        ResendEmail {
            from: &self.from,
            to: [to],
            subject: &record.title,
            text: &record.body,
        }
    }
}

#[async_trait]
impl Backend for EmailBackend {
    fn title(&self) -> String {
        "Email".to_string()
    }

    async fn send(&self, record: &AlertRecord) -> Result<(), DeliveryError> {
        let to = record
            .recipient_email
            .as_deref()
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| {
                DeliveryError::CouldNotDeliver(format!(
                    "recipient {} has no email address",
                    record.recipient_id
                ))
            })?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&self.payload(to, record))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(record_id = %record.id, error = %e, "HTTP request to Resend failed");
                anyhow::Error::from(e).context("email request failed")
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(
                record_id = %record.id,
                status = %status,
                body = %text,
                "Resend rejected email"
            );
            return Err(DeliveryError::CouldNotDeliver(format!(
                "Resend returned HTTP {}: {}",
                status, text
            )));
        }

        tracing::debug!(record_id = %record.id, "Email accepted by Resend");
        Ok(())
    }
}
