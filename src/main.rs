//! Flight logger service

use std::sync::Arc;

use flight_logger::{
    api::{build_router, AppState},
    config::AppConfig,
    database::Database,
    errors::FlightLoggerError,
    feed::HttpFeed,
    poller::Poller,
    settings::{RuntimeSettings, SettingsStore},
    state::RuntimeState,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), FlightLoggerError> {
    #[cfg(feature = "dotenvy")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;

    info!("Flight Logger v{}", env!("CARGO_PKG_VERSION"));
    info!("Feed: {}", config.feed.url());
    info!("Interval: {} seconds", config.settings.interval);
    info!(
        "Retention: {} days (0 = forever)",
        config.settings.retention_days
    );
    info!("Database: {}", config.database.path.display());

    config.database.validate()?;
    let database = Database::open(&config.database.path).await?;

    let settings = Arc::new(SettingsStore::new(
        &config.settings.path,
        &config.settings.user_config_path,
    ));
    let defaults = RuntimeSettings {
        interval: config.settings.interval,
        retention_days: config.settings.retention_days,
        paused: false,
    };
    let runtime = Arc::new(RuntimeState::new(settings.load_settings(defaults).await));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed = HttpFeed::new(&config.feed)?;
    let poller = Poller::new(feed, database.clone(), runtime.clone()).spawn(shutdown_rx);

    let app = build_router(AppState::new(database, runtime, settings));
    let listener = TcpListener::bind(config.server.bind_address()).await?;
    info!("Starting API server on {}", config.server.bind_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the poller and wait for its current tick to finish
    shutdown_tx.send(true).ok();
    if let Err(e) = poller.await {
        error!("Poller task failed: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Received shutdown signal");
}
