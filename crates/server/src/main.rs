mod bootstrap;
mod health;
pub mod routes;

use std::future::IntoFuture;
use std::time::Duration;

use anyhow::Result;
use priceye_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use priceye_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let scheduler = app.scheduler.clone();
    tokio::spawn(async move {
        scheduler.run_daily().await;
    });
    tracing::info!(event_name = "system.server.scheduler_started", "daily scheduler running");

    let router = routes::router(routes::AppState { service: app.service.clone() })
        .merge(health::router(app.db_pool.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "priceye-server listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .into_future(),
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!(event_name = "system.server.stopping", "shutdown signal received");
    let _ = shutdown_tx.send(());

    let drain = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(drain, server).await.is_err() {
        tracing::warn!(
            event_name = "system.server.drain_timeout",
            "open connections did not drain before the shutdown deadline"
        );
    }
    tracing::info!(event_name = "system.server.stopped", "priceye-server stopped");

    Ok(())
}
