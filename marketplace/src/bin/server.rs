//! Marketplace HTTP server.
//!
//! Reads configuration from the environment (and `.env`), migrates the
//! database, then serves the API until Ctrl+C or SIGTERM.

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use surplus_core::environment::SystemClock;
use surplus_marketplace::{
    AppError, Config,
    metrics::{install_prometheus_recorder, register_business_metrics},
    notify::AuditLogSink,
    server::{AppState, Collaborators, build_router, shutdown_signal},
};
use surplus_postgres::{PostgresBuyerDirectory, PostgresInventoryStore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine; the environment may be set by the deployment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "surplus_marketplace=info,surplus_postgres=info,audit=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting surplus marketplace server");

    let config = Config::from_env();
    info!(
        bind_address = %config.bind_address(),
        default_radius_km = config.marketplace.default_radius_km,
        early_access_minutes = config.marketplace.early_access_minutes,
        sweep_enabled = config.marketplace.cron_secret.is_some(),
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .idle_timeout(Duration::from_secs(config.postgres.idle_timeout))
        .connect(&config.postgres.url)
        .await
        .map_err(AppError::Database)?;

    let store = PostgresInventoryStore::from_pool(pool.clone());
    store.migrate().await.map_err(AppError::Migration)?;
    info!("Database ready");

    let metrics = install_prometheus_recorder()?;
    register_business_metrics();

    let directory = Arc::new(PostgresBuyerDirectory::new(pool.clone()));
    let collaborators = Collaborators {
        store: Arc::new(store),
        profiles: directory.clone(),
        favorites: directory,
        notifications: Some(Arc::new(AuditLogSink)),
        clock: Arc::new(SystemClock),
    };
    let state = AppState::new(collaborators, config.marketplace.clone())
        .with_metrics(metrics)
        .with_database(pool);

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .map_err(AppError::Server)?;
    info!(address = %config.bind_address(), "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    info!("Server shutdown complete");
    Ok(())
}
