//! Delivery backends for the relay dispatcher.
//!
//! - `EmailBackend`: Resend HTTP API
//! - `WebhookBackend`: Discord-compatible webhook
//! - `LogBackend`: structured log output, used when nothing else is configured

pub mod email;
pub mod log;
pub mod webhook;

use std::sync::Arc;

use relay_common::config::AppConfig;
use relay_engine::backend::Backend;

pub use email::EmailBackend;
pub use log::LogBackend;
pub use webhook::WebhookBackend;

/// Backends enabled by the given configuration, in registration order.
///
/// Alert types that don't name their backends fan out to all of these. The
/// webhook posts to a single shared channel, so personal alert types should
/// target the email backend explicitly.
pub fn configured_backends(config: &AppConfig) -> Vec<Arc<dyn Backend>> {
    let mut backends: Vec<Arc<dyn Backend>> = Vec::new();

    if let (Some(api_key), Some(from)) = (&config.resend_api_key, &config.email_from) {
        backends.push(Arc::new(EmailBackend::new(api_key.clone(), from.clone())));
    }
    if let Some(url) = &config.discord_webhook_url {
        backends.push(Arc::new(WebhookBackend::new(url.clone())));
    }
    if backends.is_empty() {
        tracing::warn!("No delivery backends configured, alerts will only be logged");
        backends.push(Arc::new(LogBackend));
    }

    backends
}
