use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use relay_common::config::AppConfig;
use relay_common::db;
use relay_engine::dispatcher::Dispatcher;
use relay_engine::postgres::PgAlertStore;
use relay_engine::registry::BackendRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_dispatcher=info,relay_engine=info,relay_notifier=info".into()),
        )
        .json()
        .init();

    tracing::info!("Relay dispatcher starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database and apply migrations
    let pool = db::create_pool(&config).await?;
    db::migrate(&pool).await?;

    // Register delivery backends
    let mut backends = BackendRegistry::new();
    for backend in relay_notifier::configured_backends(&config) {
        backends.register_arc(backend)?;
    }
    let backends = Arc::new(backends);

    let store = Arc::new(PgAlertStore::new(pool));
    let dispatcher = Dispatcher::new(store, backends)
        .with_lease(Duration::from_secs(config.claim_lease_secs));
    let interval = Duration::from_millis(config.dispatch_interval_ms);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::with_capacity(config.dispatch_workers);
    for i in 0..config.dispatch_workers {
        let worker = dispatcher
            .clone()
            .with_worker_id(format!("{}-{}", config.worker_id, i));
        let shutdown_rx = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            worker.run(interval, shutdown_rx).await
        }));
    }

    tracing::info!(
        workers = config.dispatch_workers,
        interval_ms = config.dispatch_interval_ms,
        "Dispatch workers running"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, finishing in-flight sweeps...");
    shutdown_tx.send(true)?;

    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Dispatch worker panicked");
        }
    }

    tracing::info!("Relay dispatcher stopped.");
    Ok(())
}
