//! Deterministic demo dataset for `priceye seed` and manual exploration.
//! Same inputs every run, so prices produced on top of it are reproducible.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use serde_json::json;

use priceye_core::domain::forecast::DemandForecast;
use priceye_core::domain::group::{Group, GroupId};
use priceye_core::domain::integration::{IntegrationId, PmsIntegration};
use priceye_core::domain::property::{Property, PropertyId, Strategy, TenantId};
use priceye_core::domain::quota::AiQuotaCounter;
use priceye_core::domain::status::{AutoPricingStatus, EntityRef};

use crate::repositories::{
    AutoPricingRepository, ForecastRepository, GroupRepository, IntegrationRepository,
    PropertyRepository, QuotaRepository, RepositoryError, SqlAutoPricingRepository,
    SqlForecastRepository, SqlGroupRepository, SqlIntegrationRepository, SqlPropertyRepository,
    SqlQuotaRepository,
};
use crate::DbPool;

pub const DEMO_TENANT: &str = "T-DEMO";

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub tenant_id: String,
    pub properties: usize,
    pub groups: usize,
    pub forecast_days: usize,
    pub ai_calls_max: i64,
}

pub struct SeedDataset {
    forecast_start: NaiveDate,
    forecast_days: usize,
}

impl SeedDataset {
    pub fn demo(forecast_start: NaiveDate) -> Self {
        Self { forecast_start, forecast_days: 30 }
    }

    pub async fn apply(&self, pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let tenant = TenantId(DEMO_TENANT.to_string());
        let seeded_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now);

        let integrations = SqlIntegrationRepository::new(pool.clone());
        integrations
            .save(PmsIntegration {
                id: IntegrationId("I-DEMO".to_string()),
                tenant_id: tenant.clone(),
                integration_type: "mock".to_string(),
                credentials: json!({"note": "demo credentials"}),
                active: true,
            })
            .await?;

        let properties = SqlPropertyRepository::new(pool.clone());
        let demo_properties = [
            ("P-LOFT", "Downtown Loft", Strategy::Balanced, 10_000, 8_000, Some(20_000)),
            ("P-VILLA", "Seaside Villa", Strategy::Aggressive, 25_000, 15_000, None),
            ("P-STUDIO", "Riverside Studio", Strategy::Prudent, 7_500, 6_000, Some(12_000)),
        ];
        for (id, name, strategy, base, floor, ceiling) in demo_properties {
            properties
                .save(Property {
                    id: PropertyId(id.to_string()),
                    tenant_id: tenant.clone(),
                    pms_integration_id: Some("I-DEMO".to_string()),
                    pms_id: Some(format!("pms-{id}")),
                    name: name.to_string(),
                    city: "Lisbon".to_string(),
                    property_type: "apartment".to_string(),
                    currency: "EUR".to_string(),
                    tz_offset_minutes: 60,
                    base_price: base,
                    floor_price: floor,
                    ceiling_price: ceiling,
                    strategy,
                    pricing_enabled: true,
                    pms_sync_enabled: true,
                    created_at: seeded_at,
                    updated_at: seeded_at,
                })
                .await?;
        }

        let groups = SqlGroupRepository::new(pool.clone());
        groups
            .save(Group {
                id: GroupId("G-WATERFRONT".to_string()),
                tenant_id: tenant.clone(),
                name: "Waterfront".to_string(),
                main_property_id: Some(PropertyId("P-VILLA".to_string())),
                member_property_ids: vec![
                    PropertyId("P-VILLA".to_string()),
                    PropertyId("P-STUDIO".to_string()),
                ],
                sync_prices: true,
                created_at: seeded_at,
                updated_at: seeded_at,
            })
            .await?;

        // Wavy demand curve: weekend peaks, midweek troughs.
        let forecasts = SqlForecastRepository::new(pool.clone());
        let mut rows = Vec::with_capacity(self.forecast_days);
        for offset in 0..self.forecast_days {
            let date = self.forecast_start + Duration::days(offset as i64);
            let score = match offset % 7 {
                4 | 5 => 85.0,
                6 => 70.0,
                _ => 45.0 + (offset % 7) as f64 * 5.0,
            };
            rows.push(DemandForecast {
                city: "Lisbon".to_string(),
                property_type: "apartment".to_string(),
                forecast_date: date,
                demand_score: score,
            });
        }
        forecasts.upsert_many(rows).await?;

        let statuses = SqlAutoPricingRepository::new(pool.clone());
        statuses
            .save(AutoPricingStatus::new(
                EntityRef::Property(PropertyId("P-LOFT".to_string())),
                tenant.clone(),
                true,
            ))
            .await?;
        statuses
            .save(AutoPricingStatus::new(
                EntityRef::Group(GroupId("G-WATERFRONT".to_string())),
                tenant.clone(),
                true,
            ))
            .await?;

        let quota = SqlQuotaRepository::new(pool.clone());
        let ai_calls_max = 1_000;
        quota
            .save(AiQuotaCounter {
                tenant_id: tenant.clone(),
                window_start: seeded_at,
                ai_calls_used: 0,
                ai_calls_max,
            })
            .await?;

        Ok(SeedResult {
            tenant_id: tenant.0,
            properties: demo_properties.len(),
            groups: 1,
            forecast_days: self.forecast_days,
            ai_calls_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use priceye_core::domain::group::GroupId;
    use priceye_core::domain::property::TenantId;

    use super::{SeedDataset, DEMO_TENANT};
    use crate::repositories::{
        AutoPricingRepository, GroupRepository, PropertyRepository, SqlAutoPricingRepository,
        SqlGroupRepository, SqlPropertyRepository,
    };
    use crate::{connect_with_settings, migrations};

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid test date")
    }

    #[tokio::test]
    async fn seeding_twice_is_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let dataset = SeedDataset::demo(date("2025-06-01"));
        let first = dataset.apply(&pool).await.expect("first seed");
        let second = dataset.apply(&pool).await.expect("second seed");
        assert_eq!(first.properties, second.properties);

        let tenant = TenantId(DEMO_TENANT.to_string());
        let properties = SqlPropertyRepository::new(pool.clone())
            .list_for_tenant(&tenant)
            .await
            .expect("list properties");
        assert_eq!(properties.len(), 3);

        let group = SqlGroupRepository::new(pool.clone())
            .find(&tenant, &GroupId("G-WATERFRONT".to_string()))
            .await
            .expect("find group")
            .expect("group exists");
        assert!(group.sync_prices);

        let enabled = SqlAutoPricingRepository::new(pool.clone())
            .list_enabled(&tenant)
            .await
            .expect("list enabled");
        assert_eq!(enabled.len(), 2);
    }
}
