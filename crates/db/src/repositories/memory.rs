//! In-memory repository doubles for engine and service tests. They keep the
//! write-path invariants (overlap, closure, upsert-by-key, atomic quota
//! reservation) but only the tenant-carrying tables enforce tenancy; the
//! SQL implementations remain the authority on cross-tenant predicates.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

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

use crate::repositories::{
    AutoPricingRepository, BookingRepository, ForecastRepository, GroupRepository,
    IntegrationRepository, OverrideRepository, PropertyRepository, QuotaRepository,
    RecommendationRepository, RepositoryError,
};

fn poisoned(what: &str) -> RepositoryError {
    RepositoryError::Decode(format!("in-memory {what} lock poisoned"))
}

#[derive(Default)]
pub struct InMemoryPropertyRepository {
    rows: Mutex<HashMap<String, Property>>,
}

impl InMemoryPropertyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_properties(properties: Vec<Property>) -> Self {
        let rows = properties.into_iter().map(|p| (p.id.0.clone(), p)).collect();
        Self { rows: Mutex::new(rows) }
    }
}

#[async_trait]
impl PropertyRepository for InMemoryPropertyRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &PropertyId,
    ) -> Result<Option<Property>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("properties"))?;
        match rows.get(&id.0) {
            None => Ok(None),
            Some(property) if property.tenant_id != *tenant_id => {
                Err(RepositoryError::TenantScope { tenant_id: tenant_id.clone() })
            }
            Some(property) => Ok(Some(property.clone())),
        }
    }

    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Property>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("properties"))?;
        let mut properties: Vec<Property> =
            rows.values().filter(|p| p.tenant_id == *tenant_id).cloned().collect();
        properties.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(properties)
    }

    async fn save(&self, property: Property) -> Result<(), RepositoryError> {
        property.validate()?;
        let mut rows = self.rows.lock().map_err(|_| poisoned("properties"))?;
        if let Some(existing) = rows.get(&property.id.0) {
            if existing.tenant_id != property.tenant_id {
                return Err(RepositoryError::TenantScope { tenant_id: property.tenant_id });
            }
        }
        rows.insert(property.id.0.clone(), property);
        Ok(())
    }

    async fn delete(&self, tenant_id: &TenantId, id: &PropertyId) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned("properties"))?;
        if let Some(existing) = rows.get(&id.0) {
            if existing.tenant_id != *tenant_id {
                return Err(RepositoryError::TenantScope { tenant_id: tenant_id.clone() });
            }
            rows.remove(&id.0);
        }
        Ok(())
    }

    async fn set_pms_sync_enabled(
        &self,
        tenant_id: &TenantId,
        id: &PropertyId,
        enabled: bool,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned("properties"))?;
        if let Some(property) = rows.get_mut(&id.0) {
            if property.tenant_id == *tenant_id {
                property.pms_sync_enabled = enabled;
                property.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryGroupRepository {
    rows: Mutex<HashMap<String, Group>>,
}

impl InMemoryGroupRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupRepository for InMemoryGroupRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &GroupId,
    ) -> Result<Option<Group>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("groups"))?;
        match rows.get(&id.0) {
            None => Ok(None),
            Some(group) if group.tenant_id != *tenant_id => {
                Err(RepositoryError::TenantScope { tenant_id: tenant_id.clone() })
            }
            Some(group) => Ok(Some(group.clone())),
        }
    }

    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Group>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("groups"))?;
        let mut groups: Vec<Group> =
            rows.values().filter(|g| g.tenant_id == *tenant_id).cloned().collect();
        groups.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(groups)
    }

    async fn save(&self, group: Group) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned("groups"))?;
        let siblings: Vec<(GroupId, Vec<PropertyId>)> = rows
            .values()
            .filter(|g| g.tenant_id == group.tenant_id)
            .map(|g| (g.id.clone(), g.member_property_ids.clone()))
            .collect();
        group.validate(&siblings)?;
        rows.insert(group.id.0.clone(), group);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBookingRepository {
    rows: Mutex<Vec<Booking>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert(&self, _tenant_id: &TenantId, booking: Booking) -> Result<(), RepositoryError> {
        booking.validate()?;
        let mut rows = self.rows.lock().map_err(|_| poisoned("bookings"))?;
        if rows.iter().any(|existing| existing.overlaps(&booking)) {
            return Err(RepositoryError::Domain(DomainError::BookingOverlap {
                property_id: booking.property_id,
            }));
        }
        rows.push(booking);
        Ok(())
    }

    async fn list_for_month(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        year: i32,
        month: u32,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let from = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid month {year}-{month:02}")))?;
        let to = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| RepositoryError::Decode(format!("invalid month {year}-{month:02}")))?;

        self.list_in_range(tenant_id, property_id, from, to).await
    }

    async fn list_in_range(
        &self,
        _tenant_id: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("bookings"))?;
        let mut matches: Vec<Booking> = rows
            .iter()
            .filter(|b| {
                b.property_id == *property_id && b.start_date < to && b.end_date_exclusive > from
            })
            .cloned()
            .collect();
        matches.sort_by_key(|b| b.start_date);
        Ok(matches)
    }
}

#[derive(Default)]
pub struct InMemoryOverrideRepository {
    rows: Mutex<HashMap<(String, NaiveDate), PriceOverride>>,
}

impl InMemoryOverrideRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OverrideRepository for InMemoryOverrideRepository {
    async fn list_range(
        &self,
        _tenant_id: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceOverride>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("overrides"))?;
        let mut matches: Vec<PriceOverride> = rows
            .values()
            .filter(|o| o.property_id == *property_id && o.date >= from && o.date < to)
            .cloned()
            .collect();
        matches.sort_by_key(|o| o.date);
        Ok(matches)
    }

    async fn upsert_many(
        &self,
        _tenant_id: &TenantId,
        property_id: &PropertyId,
        overrides: Vec<PriceOverride>,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned("overrides"))?;
        for record in overrides {
            if record.property_id != *property_id {
                return Err(RepositoryError::Domain(DomainError::InvariantViolation(format!(
                    "override for {} in a batch addressed to {}",
                    record.property_id.0, property_id.0
                ))));
            }
            rows.insert((record.property_id.0.clone(), record.date), record);
        }
        Ok(())
    }

    async fn locked_dates(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RepositoryError> {
        Ok(self
            .list_range(tenant_id, property_id, from, to)
            .await?
            .into_iter()
            .filter(|o| o.is_locked)
            .map(|o| o.date)
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryRecommendationRepository {
    rows: Mutex<HashMap<(String, NaiveDate), PricingRecommendation>>,
}

impl InMemoryRecommendationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecommendationRepository for InMemoryRecommendationRepository {
    async fn upsert_many(
        &self,
        _tenant_id: &TenantId,
        property_id: &PropertyId,
        recommendations: Vec<PricingRecommendation>,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned("recommendations"))?;
        for rec in recommendations {
            if rec.property_id != *property_id {
                return Err(RepositoryError::Domain(DomainError::InvariantViolation(format!(
                    "recommendation for {} in a batch addressed to {}",
                    rec.property_id.0, property_id.0
                ))));
            }
            rows.insert((rec.property_id.0.clone(), rec.date), rec);
        }
        Ok(())
    }

    async fn list_range(
        &self,
        _tenant_id: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricingRecommendation>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("recommendations"))?;
        let mut matches: Vec<PricingRecommendation> = rows
            .values()
            .filter(|r| r.property_id == *property_id && r.date >= from && r.date < to)
            .cloned()
            .collect();
        matches.sort_by_key(|r| r.date);
        Ok(matches)
    }

    async fn latest_generated_at(
        &self,
        _tenant_id: &TenantId,
        property_id: &PropertyId,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("recommendations"))?;
        Ok(rows
            .values()
            .filter(|r| r.property_id == *property_id)
            .map(|r| r.generated_at)
            .max())
    }
}

#[derive(Default)]
pub struct InMemoryForecastRepository {
    rows: Mutex<HashMap<(String, String, NaiveDate), DemandForecast>>,
}

impl InMemoryForecastRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forecasts(forecasts: Vec<DemandForecast>) -> Self {
        let rows = forecasts
            .into_iter()
            .map(|f| ((f.city.clone(), f.property_type.clone(), f.forecast_date), f))
            .collect();
        Self { rows: Mutex::new(rows) }
    }
}

#[async_trait]
impl ForecastRepository for InMemoryForecastRepository {
    async fn list_range(
        &self,
        city: &str,
        property_type: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DemandForecast>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("forecasts"))?;
        let mut matches: Vec<DemandForecast> = rows
            .values()
            .filter(|f| {
                f.city == city
                    && f.property_type == property_type
                    && f.forecast_date >= from
                    && f.forecast_date < to
            })
            .cloned()
            .collect();
        matches.sort_by_key(|f| f.forecast_date);
        Ok(matches)
    }

    async fn upsert_many(&self, forecasts: Vec<DemandForecast>) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned("forecasts"))?;
        for forecast in forecasts {
            rows.insert(
                (forecast.city.clone(), forecast.property_type.clone(), forecast.forecast_date),
                forecast,
            );
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAutoPricingRepository {
    rows: Mutex<HashMap<EntityRef, AutoPricingStatus>>,
}

impl InMemoryAutoPricingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AutoPricingRepository for InMemoryAutoPricingRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        entity: &EntityRef,
    ) -> Result<Option<AutoPricingStatus>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("auto-pricing status"))?;
        match rows.get(entity) {
            None => Ok(None),
            Some(status) if status.tenant_id != *tenant_id => {
                Err(RepositoryError::TenantScope { tenant_id: tenant_id.clone() })
            }
            Some(status) => Ok(Some(status.clone())),
        }
    }

    async fn list_enabled(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<AutoPricingStatus>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("auto-pricing status"))?;
        let mut statuses: Vec<AutoPricingStatus> =
            rows.values().filter(|s| s.tenant_id == *tenant_id && s.enabled).cloned().collect();
        statuses.sort_by(|a, b| a.entity.entity_id().cmp(b.entity.entity_id()));
        Ok(statuses)
    }

    async fn list_tenants_with_enabled_entities(&self) -> Result<Vec<TenantId>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("auto-pricing status"))?;
        let mut tenants: Vec<TenantId> =
            rows.values().filter(|s| s.enabled).map(|s| s.tenant_id.clone()).collect();
        tenants.sort_by(|a, b| a.0.cmp(&b.0));
        tenants.dedup();
        Ok(tenants)
    }

    async fn save(&self, status: AutoPricingStatus) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned("auto-pricing status"))?;
        rows.insert(status.entity.clone(), status);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryQuotaRepository {
    rows: Mutex<HashMap<String, AiQuotaCounter>>,
}

impl InMemoryQuotaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counter(counter: AiQuotaCounter) -> Self {
        let rows = HashMap::from([(counter.tenant_id.0.clone(), counter)]);
        Self { rows: Mutex::new(rows) }
    }
}

#[async_trait]
impl QuotaRepository for InMemoryQuotaRepository {
    async fn find(&self, tenant_id: &TenantId) -> Result<Option<AiQuotaCounter>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("quota"))?;
        Ok(rows.get(&tenant_id.0).cloned())
    }

    async fn save(&self, counter: AiQuotaCounter) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned("quota"))?;
        rows.insert(counter.tenant_id.0.clone(), counter);
        Ok(())
    }

    async fn try_reserve(
        &self,
        tenant_id: &TenantId,
        amount: i64,
    ) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned("quota"))?;
        match rows.get_mut(&tenant_id.0) {
            Some(counter) if counter.ai_calls_used + amount <= counter.ai_calls_max => {
                counter.ai_calls_used += amount;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryIntegrationRepository {
    rows: Mutex<HashMap<String, PmsIntegration>>,
}

impl InMemoryIntegrationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_integrations(integrations: Vec<PmsIntegration>) -> Self {
        let rows = integrations.into_iter().map(|i| (i.id.0.clone(), i)).collect();
        Self { rows: Mutex::new(rows) }
    }
}

#[async_trait]
impl IntegrationRepository for InMemoryIntegrationRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &IntegrationId,
    ) -> Result<Option<PmsIntegration>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| poisoned("integrations"))?;
        match rows.get(&id.0) {
            None => Ok(None),
            Some(integration) if integration.tenant_id != *tenant_id => {
                Err(RepositoryError::TenantScope { tenant_id: tenant_id.clone() })
            }
            Some(integration) => Ok(Some(integration.clone())),
        }
    }

    async fn save(&self, integration: PmsIntegration) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned("integrations"))?;
        rows.insert(integration.id.0.clone(), integration);
        Ok(())
    }

    async fn set_active(
        &self,
        tenant_id: &TenantId,
        id: &IntegrationId,
        active: bool,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned("integrations"))?;
        if let Some(integration) = rows.get_mut(&id.0) {
            if integration.tenant_id == *tenant_id {
                integration.active = active;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use priceye_core::domain::property::TenantId;
    use priceye_core::domain::quota::AiQuotaCounter;

    use super::InMemoryQuotaRepository;
    use crate::repositories::QuotaRepository;

    #[tokio::test]
    async fn in_memory_quota_matches_sql_reservation_semantics() {
        let repo = InMemoryQuotaRepository::with_counter(AiQuotaCounter {
            tenant_id: TenantId("T-1".to_string()),
            window_start: Utc::now(),
            ai_calls_used: 0,
            ai_calls_max: 2,
        });
        let tenant = TenantId("T-1".to_string());

        assert!(repo.try_reserve(&tenant, 2).await.expect("reserve"));
        assert!(!repo.try_reserve(&tenant, 1).await.expect("exhausted"));
        assert!(!repo.try_reserve(&TenantId("T-2".to_string()), 1).await.expect("no counter"));
    }
}
