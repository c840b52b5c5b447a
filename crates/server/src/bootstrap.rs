use std::sync::Arc;
use std::time::Duration;

use priceye_core::config::{AppConfig, ConfigError};
use priceye_db::repositories::{
    SqlAutoPricingRepository, SqlBookingRepository, SqlForecastRepository, SqlGroupRepository,
    SqlIntegrationRepository, SqlOverrideRepository, SqlPropertyRepository, SqlQuotaRepository,
    SqlRecommendationRepository,
};
use priceye_db::{connect, migrations, DbPool};
use priceye_engine::{EngineContext, PricingService, Scheduler, SystemClock};
use priceye_models::{FsArtifactStore, HttpLlmClient, LlmAdjuster, ModelRunner};
use priceye_pms::AdapterRegistry;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<PricingService>,
    pub scheduler: Scheduler,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Wires the full engine stack from an already-loaded config: database pool,
/// repositories, model runner, LLM adjuster and the PMS adapter registry.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let artifacts = Arc::new(FsArtifactStore::new(config.artifacts.store_dir.clone()));
    let runner = Arc::new(ModelRunner::new(artifacts));
    let llm_client = Arc::new(HttpLlmClient::new(config.llm.clone()));
    let adjuster = Arc::new(LlmAdjuster::new(llm_client, config.engine.llm_bound_pct));
    let registry = Arc::new(AdapterRegistry::with_builtin(Duration::from_secs(
        config.engine.pms_deadline_secs,
    )));

    let ctx = Arc::new(EngineContext {
        properties: Arc::new(SqlPropertyRepository::new(db_pool.clone())),
        groups: Arc::new(SqlGroupRepository::new(db_pool.clone())),
        bookings: Arc::new(SqlBookingRepository::new(db_pool.clone())),
        overrides: Arc::new(SqlOverrideRepository::new(db_pool.clone())),
        recommendations: Arc::new(SqlRecommendationRepository::new(db_pool.clone())),
        forecasts: Arc::new(SqlForecastRepository::new(db_pool.clone())),
        statuses: Arc::new(SqlAutoPricingRepository::new(db_pool.clone())),
        quotas: Arc::new(SqlQuotaRepository::new(db_pool.clone())),
        integrations: Arc::new(SqlIntegrationRepository::new(db_pool.clone())),
        runner,
        adjuster,
        registry,
        clock: Arc::new(SystemClock),
        config: config.engine.clone(),
    });

    info!(
        event_name = "system.bootstrap.engine_ready",
        horizon_days = ctx.config.horizon_days,
        "engine context assembled"
    );

    Ok(Application {
        service: Arc::new(PricingService::new(ctx.clone())),
        scheduler: Scheduler::new(ctx),
        config,
        db_pool,
    })
}
