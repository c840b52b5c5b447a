//! Shared wiring for commands that drive the engine from the command line.

use std::sync::Arc;
use std::time::Duration;

use priceye_core::config::AppConfig;
use priceye_core::{EngineError, EntityRef, GroupId, PropertyId};
use priceye_db::repositories::{
    SqlAutoPricingRepository, SqlBookingRepository, SqlForecastRepository, SqlGroupRepository,
    SqlIntegrationRepository, SqlOverrideRepository, SqlPropertyRepository, SqlQuotaRepository,
    SqlRecommendationRepository,
};
use priceye_db::DbPool;
use priceye_engine::{EngineContext, SystemClock};
use priceye_models::{FsArtifactStore, HttpLlmClient, LlmAdjuster, ModelRunner};
use priceye_pms::AdapterRegistry;

pub fn engine_context(config: &AppConfig, pool: &DbPool) -> Arc<EngineContext> {
    let artifacts = Arc::new(FsArtifactStore::new(config.artifacts.store_dir.clone()));
    let llm_client = Arc::new(HttpLlmClient::new(config.llm.clone()));

    Arc::new(EngineContext {
        properties: Arc::new(SqlPropertyRepository::new(pool.clone())),
        groups: Arc::new(SqlGroupRepository::new(pool.clone())),
        bookings: Arc::new(SqlBookingRepository::new(pool.clone())),
        overrides: Arc::new(SqlOverrideRepository::new(pool.clone())),
        recommendations: Arc::new(SqlRecommendationRepository::new(pool.clone())),
        forecasts: Arc::new(SqlForecastRepository::new(pool.clone())),
        statuses: Arc::new(SqlAutoPricingRepository::new(pool.clone())),
        quotas: Arc::new(SqlQuotaRepository::new(pool.clone())),
        integrations: Arc::new(SqlIntegrationRepository::new(pool.clone())),
        runner: Arc::new(ModelRunner::new(artifacts)),
        adjuster: Arc::new(LlmAdjuster::new(llm_client, config.engine.llm_bound_pct)),
        registry: Arc::new(AdapterRegistry::with_builtin(Duration::from_secs(
            config.engine.pms_deadline_secs,
        ))),
        clock: Arc::new(SystemClock),
        config: config.engine.clone(),
    })
}

/// Parses the `property:<id>` / `group:<id>` entity syntax used by `apply`.
pub fn parse_entity(value: &str) -> Option<EntityRef> {
    let (kind, id) = value.split_once(':')?;
    if id.is_empty() {
        return None;
    }
    match kind {
        "property" => Some(EntityRef::Property(PropertyId(id.to_string()))),
        "group" => Some(EntityRef::Group(GroupId(id.to_string()))),
        _ => None,
    }
}

pub fn classify_engine_error(error: &EngineError) -> (&'static str, u8) {
    match error {
        EngineError::InputInvalid(_) | EngineError::Domain(_) => ("input_invalid", 6),
        EngineError::TenantScopeViolation { .. } => ("tenant_scope", 6),
        EngineError::QuotaExhausted { .. } => ("quota_exhausted", 7),
        EngineError::CredentialsInvalid { .. } => ("credentials_invalid", 7),
        EngineError::Transient(_) => ("transient", 7),
        EngineError::Persistence(_) => ("persistence", 4),
        EngineError::Configuration(_) => ("config_validation", 2),
    }
}
