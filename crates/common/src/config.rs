use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Delay between dispatch ticks in milliseconds (default: 5000)
    pub dispatch_interval_ms: u64,

    /// Number of concurrent sweeps started per tick (default: 1)
    pub dispatch_workers: usize,

    /// Lease held on a record while a delivery is in flight, in seconds (default: 60)
    pub claim_lease_secs: u64,

    /// Identifier recorded in logs for this dispatcher process
    pub worker_id: String,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Discord-compatible webhook URL
    pub discord_webhook_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            dispatch_interval_ms: std::env::var("DISPATCH_INTERVAL_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DISPATCH_INTERVAL_MS must be a valid u64"))?,
            dispatch_workers: std::env::var("DISPATCH_WORKERS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DISPATCH_WORKERS must be a valid usize"))?,
            claim_lease_secs: std::env::var("CLAIM_LEASE_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CLAIM_LEASE_SECS must be a valid u64"))?,
            worker_id: std::env::var("WORKER_ID")
                .unwrap_or_else(|_| default_worker_id()),
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            discord_webhook_url: std::env::var("DISCORD_WEBHOOK_URL").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the dispatcher spin or never release a claim.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dispatch_interval_ms == 0 {
            anyhow::bail!("DISPATCH_INTERVAL_MS must be at least 1");
        }
        if self.dispatch_workers == 0 {
            anyhow::bail!("DISPATCH_WORKERS must be at least 1");
        }
        if self.claim_lease_secs == 0 {
            anyhow::bail!("CLAIM_LEASE_SECS must be at least 1");
        }
        if self.resend_api_key.is_some() && self.email_from.is_none() {
            anyhow::bail!("EMAIL_FROM is required when RESEND_API_KEY is set");
        }
        Ok(())
    }
}

/// `<hostname>-<pid>`, falling back to `dispatcher-<pid>`.
fn default_worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "dispatcher".to_string());
    format!("{}-{}", host, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/relay".to_string(),
            db_max_connections: 20,
            dispatch_interval_ms: 5000,
            dispatch_workers: 1,
            claim_lease_secs: 60,
            worker_id: "test".to_string(),
            resend_api_key: None,
            email_from: None,
            discord_webhook_url: None,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = AppConfig {
            dispatch_workers: 0,
            ..base()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = AppConfig {
            dispatch_interval_ms: 0,
            ..base()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_lease_rejected() {
        let config = AppConfig {
            claim_lease_secs: 0,
            ..base()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_email_requires_sender() {
        let config = AppConfig {
            resend_api_key: Some("re_123".to_string()),
            ..base()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            resend_api_key: Some("re_123".to_string()),
            email_from: Some("alerts@example.com".to_string()),
            ..base()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_worker_id_contains_pid() {
        assert!(default_worker_id().ends_with(&std::process::id().to_string()));
    }
}
