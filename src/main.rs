use std::sync::Arc;

use axum::routing::get;
use clap::Parser;

use moneytrack::{
    api::{self, AppState},
    categories,
    config::{Backend, CliArgs, Config},
    telemetry,
};
use moneytrack_core::StorageBackend;
use moneytrack_memory::InMemoryStorage;
use moneytrack_sqlite::SqliteStorage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);

    telemetry::init_tracing(&config.logging);
    let metrics_handle = telemetry::install_metrics_recorder()?;

    let storage: Arc<dyn StorageBackend> = match config.database.backend {
        Backend::Sqlite => Arc::new(SqliteStorage::new(&config.database.path)?),
        Backend::Memory => Arc::new(InMemoryStorage::new()),
    };

    let seeded = categories::seed_defaults(&*storage)?;
    if seeded > 0 {
        tracing::info!(seeded, "Default categories created");
    }

    let state = AppState::new(storage, config.auth.clone());
    let app = api::router(state)
        .route("/metrics", get(move || std::future::ready(metrics_handle.render())));

    let addr = config.listen_addr()?;
    tracing::info!(%addr, backend = ?config.database.backend, "API listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
