use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use priceye_core::domain::property::{PropertyId, TenantId};
use priceye_core::domain::recommendation::PricingRecommendation;
use priceye_core::errors::DomainError;

use crate::repositories::codec::{fmt_timestamp, parse_date, parse_timestamp};
use crate::repositories::{RecommendationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlRecommendationRepository {
    pool: DbPool,
}

impl SqlRecommendationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow) -> Result<PricingRecommendation, RepositoryError> {
        let date_raw: String = row.try_get("date")?;
        let key_factors_raw: String = row.try_get("key_factors_json")?;
        let model_versions_raw: String = row.try_get("model_versions_json")?;
        let generated_at_raw: String = row.try_get("generated_at")?;

        let key_factors: Vec<String> = serde_json::from_str(&key_factors_raw).map_err(|error| {
            RepositoryError::Decode(format!("invalid key_factors_json: {error}"))
        })?;
        let model_versions: BTreeMap<String, String> = serde_json::from_str(&model_versions_raw)
            .map_err(|error| {
                RepositoryError::Decode(format!("invalid model_versions_json: {error}"))
            })?;

        Ok(PricingRecommendation {
            property_id: PropertyId(row.try_get("property_id")?),
            date: parse_date("pricing_recommendations.date", &date_raw)?,
            price_prophet: row.try_get("price_prophet")?,
            price_xgboost: row.try_get("price_xgboost")?,
            price_nn: row.try_get("price_nn")?,
            price_gpt: row.try_get("price_gpt")?,
            price_recommended: row.try_get("price_recommended")?,
            confidence_score: row.try_get("confidence_score")?,
            explanation: row.try_get("explanation")?,
            key_factors,
            model_versions,
            generated_at: parse_timestamp(
                "pricing_recommendations.generated_at",
                &generated_at_raw,
            )?,
        })
    }

    async fn check_tenant(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
    ) -> Result<(), RepositoryError> {
        let owner: Option<String> =
            sqlx::query_scalar("SELECT tenant_id FROM properties WHERE id = ?")
                .bind(&property_id.0)
                .fetch_optional(&self.pool)
                .await?;

        match owner {
            None => Err(RepositoryError::Domain(DomainError::InvariantViolation(format!(
                "unknown property {}",
                property_id.0
            )))),
            Some(owner) if owner != tenant_id.0 => {
                Err(RepositoryError::TenantScope { tenant_id: tenant_id.clone() })
            }
            Some(_) => Ok(()),
        }
    }
}

#[async_trait]
impl RecommendationRepository for SqlRecommendationRepository {
    async fn upsert_many(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        recommendations: Vec<PricingRecommendation>,
    ) -> Result<(), RepositoryError> {
        self.check_tenant(tenant_id, property_id).await?;

        let mut tx = self.pool.begin().await?;

        for rec in recommendations {
            if rec.property_id != *property_id {
                return Err(RepositoryError::Domain(DomainError::InvariantViolation(format!(
                    "recommendation for {} in a batch addressed to {}",
                    rec.property_id.0, property_id.0
                ))));
            }

            let key_factors_json = serde_json::to_string(&rec.key_factors).map_err(|error| {
                RepositoryError::Decode(format!("encode key_factors: {error}"))
            })?;
            let model_versions_json =
                serde_json::to_string(&rec.model_versions).map_err(|error| {
                    RepositoryError::Decode(format!("encode model_versions: {error}"))
                })?;

            sqlx::query(
                r#"
                INSERT INTO pricing_recommendations (
                    property_id, date, price_prophet, price_xgboost, price_nn, price_gpt,
                    price_recommended, confidence_score, explanation,
                    key_factors_json, model_versions_json, generated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (property_id, date) DO UPDATE SET
                    price_prophet = excluded.price_prophet,
                    price_xgboost = excluded.price_xgboost,
                    price_nn = excluded.price_nn,
                    price_gpt = excluded.price_gpt,
                    price_recommended = excluded.price_recommended,
                    confidence_score = excluded.confidence_score,
                    explanation = excluded.explanation,
                    key_factors_json = excluded.key_factors_json,
                    model_versions_json = excluded.model_versions_json,
                    generated_at = excluded.generated_at
                "#,
            )
            .bind(&rec.property_id.0)
            .bind(rec.date.to_string())
            .bind(rec.price_prophet)
            .bind(rec.price_xgboost)
            .bind(rec.price_nn)
            .bind(rec.price_gpt)
            .bind(rec.price_recommended)
            .bind(rec.confidence_score)
            .bind(&rec.explanation)
            .bind(key_factors_json)
            .bind(model_versions_json)
            .bind(fmt_timestamp(&rec.generated_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_range(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricingRecommendation>, RepositoryError> {
        self.check_tenant(tenant_id, property_id).await?;

        let rows = sqlx::query(
            "SELECT * FROM pricing_recommendations WHERE property_id = ? AND date >= ? AND date < ? ORDER BY date",
        )
        .bind(&property_id.0)
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn latest_generated_at(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        self.check_tenant(tenant_id, property_id).await?;

        let raw: Option<String> = sqlx::query_scalar(
            "SELECT generated_at FROM pricing_recommendations WHERE property_id = ? ORDER BY generated_at DESC LIMIT 1",
        )
        .bind(&property_id.0)
        .fetch_optional(&self.pool)
        .await?;

        raw.map(|value| parse_timestamp("pricing_recommendations.generated_at", &value))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, NaiveDate, Utc};

    use priceye_core::domain::property::{PropertyId, TenantId};
    use priceye_core::domain::recommendation::PricingRecommendation;

    use crate::repositories::property::tests::{property, setup_pool};
    use crate::repositories::{
        PropertyRepository, RecommendationRepository, SqlPropertyRepository,
        SqlRecommendationRepository,
    };

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid test date")
    }

    fn recommendation(day: &str, price: i64) -> PricingRecommendation {
        PricingRecommendation {
            property_id: PropertyId("P-1".to_string()),
            date: date(day),
            price_prophet: Some(12_250),
            price_xgboost: Some(12_000),
            price_nn: Some(12_400),
            price_gpt: Some(11_800),
            price_recommended: price,
            confidence_score: 87.0,
            explanation: "Blended from four signals.".to_string(),
            key_factors: vec!["local_event".to_string()],
            model_versions: BTreeMap::from([("xgboost".to_string(), "2025-05-01".to_string())]),
            generated_at: Utc::now(),
        }
    }

    async fn setup() -> (SqlRecommendationRepository, TenantId, PropertyId) {
        let pool = setup_pool().await;
        SqlPropertyRepository::new(pool.clone()).save(property("P-1", "T-1")).await.expect("seed");
        (
            SqlRecommendationRepository::new(pool),
            TenantId("T-1".to_string()),
            PropertyId("P-1".to_string()),
        )
    }

    #[tokio::test]
    async fn upsert_and_list_round_trip_with_json_columns() {
        let (repo, tenant, property_id) = setup().await;

        repo.upsert_many(&tenant, &property_id, vec![recommendation("2025-06-02", 12_118)])
            .await
            .expect("write");

        let fetched = repo
            .list_range(&tenant, &property_id, date("2025-06-01"), date("2025-06-10"))
            .await
            .expect("list");

        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].price_recommended, 12_118);
        assert_eq!(fetched[0].key_factors, vec!["local_event".to_string()]);
        assert_eq!(
            fetched[0].model_versions.get("xgboost").map(String::as_str),
            Some("2025-05-01")
        );
    }

    #[tokio::test]
    async fn rerun_replaces_the_same_date() {
        let (repo, tenant, property_id) = setup().await;

        repo.upsert_many(&tenant, &property_id, vec![recommendation("2025-06-02", 12_118)])
            .await
            .expect("first run");
        repo.upsert_many(&tenant, &property_id, vec![recommendation("2025-06-02", 11_900)])
            .await
            .expect("second run");

        let fetched = repo
            .list_range(&tenant, &property_id, date("2025-06-01"), date("2025-06-10"))
            .await
            .expect("list");
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].price_recommended, 11_900);
    }

    #[tokio::test]
    async fn latest_generated_at_returns_the_newest_run() {
        let (repo, tenant, property_id) = setup().await;

        let mut older = recommendation("2025-06-02", 12_118);
        older.generated_at = Utc::now() - Duration::days(1);
        let newer = recommendation("2025-06-03", 12_300);
        let newest_stamp = newer.generated_at;

        repo.upsert_many(&tenant, &property_id, vec![older, newer]).await.expect("write");

        let latest = repo
            .latest_generated_at(&tenant, &property_id)
            .await
            .expect("query")
            .expect("has runs");
        assert_eq!(latest.timestamp(), newest_stamp.timestamp());
    }
}
