use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use priceye_core::domain::booking::Booking;
use priceye_core::domain::forecast::DemandForecast;
use priceye_core::domain::group::{Group, GroupId};
use priceye_core::domain::integration::{IntegrationId, PmsIntegration};
use priceye_core::domain::price_override::PriceOverride;
use priceye_core::domain::property::{Property, PropertyId, TenantId};
use priceye_core::domain::quota::AiQuotaCounter;
use priceye_core::domain::recommendation::PricingRecommendation;
use priceye_core::domain::status::{AutoPricingStatus, EntityRef};
use priceye_core::errors::DomainError;

pub mod auto_pricing;
pub mod booking;
pub(crate) mod codec;
pub mod forecast;
pub mod group;
pub mod integration;
pub mod memory;
pub mod price_override;
pub mod property;
pub mod quota;
pub mod recommendation;

pub use auto_pricing::SqlAutoPricingRepository;
pub use booking::SqlBookingRepository;
pub use forecast::SqlForecastRepository;
pub use group::SqlGroupRepository;
pub use integration::SqlIntegrationRepository;
pub use memory::{
    InMemoryAutoPricingRepository, InMemoryBookingRepository, InMemoryForecastRepository,
    InMemoryGroupRepository, InMemoryIntegrationRepository, InMemoryOverrideRepository,
    InMemoryPropertyRepository, InMemoryQuotaRepository, InMemoryRecommendationRepository,
};
pub use price_override::SqlOverrideRepository;
pub use property::SqlPropertyRepository;
pub use quota::SqlQuotaRepository;
pub use recommendation::SqlRecommendationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("row belongs to another tenant than {tenant_id:?}")]
    TenantScope { tenant_id: TenantId },
}

/// Tenant-scoped property access. Every read and write carries the caller's
/// tenant; a row that exists under another tenant surfaces as `TenantScope`,
/// never as someone else's data.
#[async_trait]
pub trait PropertyRepository: Send + Sync {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &PropertyId,
    ) -> Result<Option<Property>, RepositoryError>;

    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Property>, RepositoryError>;

    async fn save(&self, property: Property) -> Result<(), RepositoryError>;

    /// Deletes a property; any group naming it as main gets a nulled
    /// `main_property_id` instead of a cascade.
    async fn delete(&self, tenant_id: &TenantId, id: &PropertyId) -> Result<(), RepositoryError>;

    async fn set_pms_sync_enabled(
        &self,
        tenant_id: &TenantId,
        id: &PropertyId,
        enabled: bool,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &GroupId,
    ) -> Result<Option<Group>, RepositoryError>;

    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Group>, RepositoryError>;

    /// Runs the member-closure check against the tenant's other groups
    /// before writing.
    async fn save(&self, group: Group) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Rejects overlapping stays with `DomainError::BookingOverlap`.
    async fn insert(&self, tenant_id: &TenantId, booking: Booking) -> Result<(), RepositoryError>;

    async fn list_for_month(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        year: i32,
        month: u32,
    ) -> Result<Vec<Booking>, RepositoryError>;

    async fn list_in_range(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Booking>, RepositoryError>;
}

#[async_trait]
pub trait OverrideRepository: Send + Sync {
    async fn list_range(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceOverride>, RepositoryError>;

    /// Upsert on (property_id, date), last writer wins, transactional per
    /// property.
    async fn upsert_many(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        overrides: Vec<PriceOverride>,
    ) -> Result<(), RepositoryError>;

    async fn locked_dates(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RepositoryError>;
}

#[async_trait]
pub trait RecommendationRepository: Send + Sync {
    async fn upsert_many(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        recommendations: Vec<PricingRecommendation>,
    ) -> Result<(), RepositoryError>;

    async fn list_range(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricingRecommendation>, RepositoryError>;

    /// Newest `generated_at` for the property, used for the same-day
    /// idempotency check.
    async fn latest_generated_at(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError>;
}

/// Market-level forecasts are shared across tenants: no tenant predicate.
#[async_trait]
pub trait ForecastRepository: Send + Sync {
    async fn list_range(
        &self,
        city: &str,
        property_type: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DemandForecast>, RepositoryError>;

    async fn upsert_many(&self, forecasts: Vec<DemandForecast>) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AutoPricingRepository: Send + Sync {
    async fn find(
        &self,
        tenant_id: &TenantId,
        entity: &EntityRef,
    ) -> Result<Option<AutoPricingStatus>, RepositoryError>;

    async fn list_enabled(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<AutoPricingStatus>, RepositoryError>;

    async fn list_tenants_with_enabled_entities(&self) -> Result<Vec<TenantId>, RepositoryError>;

    async fn save(&self, status: AutoPricingStatus) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait QuotaRepository: Send + Sync {
    async fn find(&self, tenant_id: &TenantId) -> Result<Option<AiQuotaCounter>, RepositoryError>;

    async fn save(&self, counter: AiQuotaCounter) -> Result<(), RepositoryError>;

    /// Atomically reserves `amount` calls. Returns `false` without mutating
    /// the counter when the budget would be exceeded.
    async fn try_reserve(
        &self,
        tenant_id: &TenantId,
        amount: i64,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &IntegrationId,
    ) -> Result<Option<PmsIntegration>, RepositoryError>;

    async fn save(&self, integration: PmsIntegration) -> Result<(), RepositoryError>;

    /// Used to pause sync after a credential rejection.
    async fn set_active(
        &self,
        tenant_id: &TenantId,
        id: &IntegrationId,
        active: bool,
    ) -> Result<(), RepositoryError>;
}
