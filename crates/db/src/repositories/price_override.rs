use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use priceye_core::domain::price_override::{OverrideSource, PriceOverride};
use priceye_core::domain::property::{PropertyId, TenantId};
use priceye_core::errors::DomainError;

use crate::repositories::codec::{fmt_timestamp, parse_date, parse_timestamp};
use crate::repositories::{OverrideRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOverrideRepository {
    pool: DbPool,
}

impl SqlOverrideRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow) -> Result<PriceOverride, RepositoryError> {
        let date_raw: String = row.try_get("date")?;
        let source_raw: String = row.try_get("source")?;
        let updated_at_raw: String = row.try_get("updated_at")?;

        let source = match source_raw.as_str() {
            "manual" => OverrideSource::Manual,
            "ai" => OverrideSource::Ai,
            other => {
                return Err(RepositoryError::Decode(format!("unknown override source `{other}`")))
            }
        };

        Ok(PriceOverride {
            property_id: PropertyId(row.try_get("property_id")?),
            date: parse_date("price_overrides.date", &date_raw)?,
            price: row.try_get("price")?,
            is_locked: row.try_get::<i64, _>("is_locked")? != 0,
            reason: row.try_get("reason")?,
            source,
            updated_at: parse_timestamp("price_overrides.updated_at", &updated_at_raw)?,
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
impl OverrideRepository for SqlOverrideRepository {
    async fn list_range(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceOverride>, RepositoryError> {
        self.check_tenant(tenant_id, property_id).await?;

        let rows = sqlx::query(
            "SELECT * FROM price_overrides WHERE property_id = ? AND date >= ? AND date < ? ORDER BY date",
        )
        .bind(&property_id.0)
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn upsert_many(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        overrides: Vec<PriceOverride>,
    ) -> Result<(), RepositoryError> {
        self.check_tenant(tenant_id, property_id).await?;

        let mut tx = self.pool.begin().await?;

        for record in overrides {
            if record.property_id != *property_id {
                return Err(RepositoryError::Domain(DomainError::InvariantViolation(format!(
                    "override for {} in a batch addressed to {}",
                    record.property_id.0, property_id.0
                ))));
            }

            sqlx::query(
                r#"
                INSERT INTO price_overrides (property_id, date, price, is_locked, reason, source, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (property_id, date) DO UPDATE SET
                    price = excluded.price,
                    is_locked = excluded.is_locked,
                    reason = excluded.reason,
                    source = excluded.source,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&record.property_id.0)
            .bind(record.date.to_string())
            .bind(record.price)
            .bind(record.is_locked as i64)
            .bind(&record.reason)
            .bind(record.source.as_str())
            .bind(fmt_timestamp(&record.updated_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn locked_dates(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RepositoryError> {
        self.check_tenant(tenant_id, property_id).await?;

        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT date FROM price_overrides
            WHERE property_id = ? AND is_locked = 1 AND date >= ? AND date < ?
            ORDER BY date
            "#,
        )
        .bind(&property_id.0)
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|raw| parse_date("price_overrides.date", raw)).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use priceye_core::domain::price_override::{OverrideSource, PriceOverride};
    use priceye_core::domain::property::{PropertyId, TenantId};

    use crate::repositories::property::tests::{property, setup_pool};
    use crate::repositories::{
        OverrideRepository, PropertyRepository, SqlOverrideRepository, SqlPropertyRepository,
    };

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid test date")
    }

    fn manual(day: &str, price: i64, locked: bool) -> PriceOverride {
        PriceOverride {
            property_id: PropertyId("P-1".to_string()),
            date: date(day),
            price,
            is_locked: locked,
            reason: None,
            source: OverrideSource::Manual,
            updated_at: Utc::now(),
        }
    }

    async fn setup() -> (SqlOverrideRepository, TenantId, PropertyId) {
        let pool = setup_pool().await;
        SqlPropertyRepository::new(pool.clone()).save(property("P-1", "T-1")).await.expect("seed");
        (
            SqlOverrideRepository::new(pool),
            TenantId("T-1".to_string()),
            PropertyId("P-1".to_string()),
        )
    }

    #[tokio::test]
    async fn upsert_is_last_writer_wins_per_date() {
        let (repo, tenant, property_id) = setup().await;

        repo.upsert_many(&tenant, &property_id, vec![manual("2025-06-02", 15_000, false)])
            .await
            .expect("first write");
        repo.upsert_many(&tenant, &property_id, vec![manual("2025-06-02", 16_500, true)])
            .await
            .expect("second write");

        let fetched = repo
            .list_range(&tenant, &property_id, date("2025-06-01"), date("2025-06-10"))
            .await
            .expect("list");

        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].price, 16_500);
        assert!(fetched[0].is_locked);
    }

    #[tokio::test]
    async fn locked_dates_filters_unlocked_rows() {
        let (repo, tenant, property_id) = setup().await;

        repo.upsert_many(
            &tenant,
            &property_id,
            vec![
                manual("2025-06-02", 15_000, true),
                manual("2025-06-03", 14_000, false),
                manual("2025-06-05", 13_000, true),
            ],
        )
        .await
        .expect("write batch");

        let locked = repo
            .locked_dates(&tenant, &property_id, date("2025-06-01"), date("2025-06-10"))
            .await
            .expect("locked dates");

        assert_eq!(locked, vec![date("2025-06-02"), date("2025-06-05")]);
    }

    #[tokio::test]
    async fn mixed_property_batch_is_rejected_whole() {
        let (repo, tenant, property_id) = setup().await;

        let mut foreign = manual("2025-06-02", 15_000, false);
        foreign.property_id = PropertyId("P-2".to_string());

        let result = repo
            .upsert_many(&tenant, &property_id, vec![manual("2025-06-01", 12_000, false), foreign])
            .await;
        assert!(result.is_err());

        let fetched = repo
            .list_range(&tenant, &property_id, date("2025-06-01"), date("2025-06-10"))
            .await
            .expect("list");
        assert!(fetched.is_empty(), "failed batch must not partially apply");
    }
}
