//! Shared harness for the engine integration tests: in-memory repositories,
//! a scripted LLM client, a mock PMS adapter and a deterministic clock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use priceye_core::config::EngineConfig;
use priceye_core::{
    AiQuotaCounter, IntegrationId, PmsIntegration, Property, PropertyId, Strategy, TenantId,
};
use priceye_db::repositories::{
    InMemoryAutoPricingRepository, InMemoryBookingRepository, InMemoryForecastRepository,
    InMemoryGroupRepository, InMemoryIntegrationRepository, InMemoryOverrideRepository,
    InMemoryPropertyRepository, InMemoryQuotaRepository, InMemoryRecommendationRepository,
};
use priceye_engine::{EngineContext, FixedClock};
use priceye_models::{
    ArtifactStore, FsArtifactStore, LinearRegressor, LlmAdjuster, ManifestEntry, ModelRunner,
    ScriptedLlmClient,
};
use priceye_pms::{AdapterRegistry, MockAdapter};

pub const INTEGRATION_ID: &str = "I-1";

pub struct Harness {
    pub ctx: Arc<EngineContext>,
    pub clock: Arc<FixedClock>,
    pub llm: Arc<ScriptedLlmClient>,
    pub pms: Arc<MockAdapter>,
    pub artifacts: Arc<FsArtifactStore>,
    _artifact_dir: tempfile::TempDir,
}

impl Harness {
    /// Installs a constant-output regressor for one model slot.
    pub fn install_constant_model(&self, property_id: &str, model: &str, price: f64) {
        let property = PropertyId(property_id.to_string());
        let regressor =
            LinearRegressor { weights: vec![price, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0] };
        let digest = self.artifacts.put_object(&regressor.to_bytes()).expect("store object");
        let mut manifest =
            self.artifacts.manifest(&property).expect("read manifest").unwrap_or_default();
        manifest.models.insert(
            model.to_string(),
            ManifestEntry { digest, version: "2025-05-01".to_string() },
        );
        self.artifacts.write_manifest(&property, &manifest).expect("write manifest");
    }

    pub async fn quota_used(&self, tenant: &TenantId) -> i64 {
        self.ctx
            .quotas
            .find(tenant)
            .await
            .expect("quota lookup")
            .map(|counter| counter.ai_calls_used)
            .unwrap_or(0)
    }
}

pub fn tenant() -> TenantId {
    TenantId("T-1".to_string())
}

pub fn date(value: &str) -> chrono::NaiveDate {
    value.parse().expect("valid test date")
}

pub fn at(value: &str) -> DateTime<Utc> {
    value.parse().expect("valid test timestamp")
}

pub fn property(
    id: &str,
    tenant: &TenantId,
    base: i64,
    floor: i64,
    ceiling: Option<i64>,
    strategy: Strategy,
) -> Property {
    Property {
        id: PropertyId(id.to_string()),
        tenant_id: tenant.clone(),
        pms_integration_id: Some(INTEGRATION_ID.to_string()),
        pms_id: Some(id.to_string()),
        name: format!("Property {id}"),
        city: "Lisbon".to_string(),
        property_type: "apartment".to_string(),
        currency: "EUR".to_string(),
        tz_offset_minutes: 0,
        base_price: base,
        floor_price: floor,
        ceiling_price: ceiling,
        strategy,
        pricing_enabled: true,
        pms_sync_enabled: true,
        created_at: at("2025-01-01T00:00:00Z"),
        updated_at: at("2025-01-01T00:00:00Z"),
    }
}

pub fn build(
    tenant: &TenantId,
    properties: Vec<Property>,
    now: &str,
    horizon_days: u32,
    quota_max: i64,
) -> Harness {
    let artifact_dir = tempfile::tempdir().expect("tempdir");
    let artifacts = Arc::new(FsArtifactStore::new(artifact_dir.path()));
    let clock = Arc::new(FixedClock::at(at(now)));
    let llm = Arc::new(ScriptedLlmClient::new());
    let pms = Arc::new(MockAdapter::new());

    let mut registry = AdapterRegistry::new();
    registry.register("mock", pms.clone());

    let mut config = EngineConfig::default();
    config.horizon_days = horizon_days;

    let integration = PmsIntegration {
        id: IntegrationId(INTEGRATION_ID.to_string()),
        tenant_id: tenant.clone(),
        integration_type: "mock".to_string(),
        credentials: json!({}),
        active: true,
    };
    let counter = AiQuotaCounter {
        tenant_id: tenant.clone(),
        window_start: at(now),
        ai_calls_used: 0,
        ai_calls_max: quota_max,
    };

    let ctx = Arc::new(EngineContext {
        properties: Arc::new(InMemoryPropertyRepository::with_properties(properties)),
        groups: Arc::new(InMemoryGroupRepository::new()),
        bookings: Arc::new(InMemoryBookingRepository::new()),
        overrides: Arc::new(InMemoryOverrideRepository::new()),
        recommendations: Arc::new(InMemoryRecommendationRepository::new()),
        forecasts: Arc::new(InMemoryForecastRepository::new()),
        statuses: Arc::new(InMemoryAutoPricingRepository::new()),
        quotas: Arc::new(InMemoryQuotaRepository::with_counter(counter)),
        integrations: Arc::new(InMemoryIntegrationRepository::with_integrations(vec![
            integration,
        ])),
        runner: Arc::new(ModelRunner::new(artifacts.clone())),
        adjuster: Arc::new(LlmAdjuster::new(llm.clone(), 30.0)),
        registry: Arc::new(registry),
        clock: clock.clone(),
        config,
    });

    Harness { ctx, clock, llm, pms, artifacts, _artifact_dir: artifact_dir }
}
