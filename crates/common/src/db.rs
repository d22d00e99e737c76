use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::AppConfig;

/// How long a sweep waits for a pooled connection before giving up on a record.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Create the PostgreSQL pool shared by every concurrent sweep in this process.
///
/// Each in-flight claim or completion borrows one connection for a single
/// statement, so `db_max_connections` bounds how many records can be
/// transitioning at once, not how many sweeps may run.
pub async fn create_pool(config: &AppConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Connected to PostgreSQL"
    );
    Ok(pool)
}

/// Apply the alert schema in `migrations/`.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
