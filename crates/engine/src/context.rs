//! Shared wiring for the engine components: repositories, model runner,
//! adjuster, PMS registry, clock and the engine knobs from config. Every
//! component holds an `Arc<EngineContext>`; tests assemble one over the
//! in-memory repositories.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use priceye_core::config::EngineConfig;
use priceye_core::EngineError;
use priceye_db::repositories::{
    AutoPricingRepository, BookingRepository, ForecastRepository, GroupRepository,
    IntegrationRepository, OverrideRepository, PropertyRepository, QuotaRepository,
    RecommendationRepository, RepositoryError,
};
use priceye_models::{LlmAdjuster, ModelRunner};
use priceye_pms::AdapterRegistry;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct EngineContext {
    pub properties: Arc<dyn PropertyRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub overrides: Arc<dyn OverrideRepository>,
    pub recommendations: Arc<dyn RecommendationRepository>,
    pub forecasts: Arc<dyn ForecastRepository>,
    pub statuses: Arc<dyn AutoPricingRepository>,
    pub quotas: Arc<dyn QuotaRepository>,
    pub integrations: Arc<dyn IntegrationRepository>,
    pub runner: Arc<ModelRunner>,
    pub adjuster: Arc<LlmAdjuster>,
    pub registry: Arc<AdapterRegistry>,
    pub clock: Arc<dyn Clock>,
    pub config: EngineConfig,
}

/// Maps repository failures onto the engine taxonomy. Tenant scope
/// violations keep their identity; everything else is a persistence
/// failure.
pub(crate) fn map_repo_error(error: RepositoryError) -> EngineError {
    match error {
        RepositoryError::Domain(domain) => EngineError::Domain(domain),
        RepositoryError::TenantScope { tenant_id } => {
            EngineError::TenantScopeViolation { tenant_id }
        }
        other => EngineError::Persistence(other.to_string()),
    }
}
