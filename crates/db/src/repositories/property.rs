use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use priceye_core::domain::property::{Property, PropertyId, Strategy, TenantId};

use crate::repositories::codec::{fmt_timestamp, parse_timestamp};
use crate::repositories::{PropertyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPropertyRepository {
    pool: DbPool,
}

impl SqlPropertyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn owner_of(&self, id: &PropertyId) -> Result<Option<TenantId>, RepositoryError> {
        let owner: Option<String> =
            sqlx::query_scalar("SELECT tenant_id FROM properties WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(owner.map(TenantId))
    }

    fn from_row(row: &SqliteRow) -> Result<Property, RepositoryError> {
        let strategy_raw: String = row.try_get("strategy")?;
        let created_at_raw: String = row.try_get("created_at")?;
        let updated_at_raw: String = row.try_get("updated_at")?;

        Ok(Property {
            id: PropertyId(row.try_get("id")?),
            tenant_id: TenantId(row.try_get("tenant_id")?),
            pms_integration_id: row.try_get("pms_integration_id")?,
            pms_id: row.try_get("pms_id")?,
            name: row.try_get("name")?,
            city: row.try_get("city")?,
            property_type: row.try_get("property_type")?,
            currency: row.try_get("currency")?,
            tz_offset_minutes: row.try_get::<i64, _>("tz_offset_minutes")? as i32,
            base_price: row.try_get("base_price")?,
            floor_price: row.try_get("floor_price")?,
            ceiling_price: row.try_get("ceiling_price")?,
            strategy: Strategy::parse(&strategy_raw)?,
            pricing_enabled: row.try_get::<i64, _>("pricing_enabled")? != 0,
            pms_sync_enabled: row.try_get::<i64, _>("pms_sync_enabled")? != 0,
            created_at: parse_timestamp("properties.created_at", &created_at_raw)?,
            updated_at: parse_timestamp("properties.updated_at", &updated_at_raw)?,
        })
    }
}

#[async_trait]
impl PropertyRepository for SqlPropertyRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &PropertyId,
    ) -> Result<Option<Property>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM properties WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let property = Self::from_row(&row)?;
                if property.tenant_id != *tenant_id {
                    return Err(RepositoryError::TenantScope { tenant_id: tenant_id.clone() });
                }
                Ok(Some(property))
            }
        }
    }

    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Property>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM properties WHERE tenant_id = ? ORDER BY id")
            .bind(&tenant_id.0)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn save(&self, property: Property) -> Result<(), RepositoryError> {
        property.validate()?;

        if let Some(owner) = self.owner_of(&property.id).await? {
            if owner != property.tenant_id {
                return Err(RepositoryError::TenantScope { tenant_id: property.tenant_id });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO properties (
                id, tenant_id, pms_integration_id, pms_id, name, city, property_type,
                currency, tz_offset_minutes, base_price, floor_price, ceiling_price,
                strategy, pricing_enabled, pms_sync_enabled, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                pms_integration_id = excluded.pms_integration_id,
                pms_id = excluded.pms_id,
                name = excluded.name,
                city = excluded.city,
                property_type = excluded.property_type,
                currency = excluded.currency,
                tz_offset_minutes = excluded.tz_offset_minutes,
                base_price = excluded.base_price,
                floor_price = excluded.floor_price,
                ceiling_price = excluded.ceiling_price,
                strategy = excluded.strategy,
                pricing_enabled = excluded.pricing_enabled,
                pms_sync_enabled = excluded.pms_sync_enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&property.id.0)
        .bind(&property.tenant_id.0)
        .bind(&property.pms_integration_id)
        .bind(&property.pms_id)
        .bind(&property.name)
        .bind(&property.city)
        .bind(&property.property_type)
        .bind(&property.currency)
        .bind(property.tz_offset_minutes as i64)
        .bind(property.base_price)
        .bind(property.floor_price)
        .bind(property.ceiling_price)
        .bind(property.strategy.as_str())
        .bind(property.pricing_enabled as i64)
        .bind(property.pms_sync_enabled as i64)
        .bind(fmt_timestamp(&property.created_at))
        .bind(fmt_timestamp(&property.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, tenant_id: &TenantId, id: &PropertyId) -> Result<(), RepositoryError> {
        if let Some(owner) = self.owner_of(id).await? {
            if owner != *tenant_id {
                return Err(RepositoryError::TenantScope { tenant_id: tenant_id.clone() });
            }
        }

        // groups.main_property_id is ON DELETE SET NULL; members cascade.
        sqlx::query("DELETE FROM properties WHERE id = ? AND tenant_id = ?")
            .bind(&id.0)
            .bind(&tenant_id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_pms_sync_enabled(
        &self,
        tenant_id: &TenantId,
        id: &PropertyId,
        enabled: bool,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE properties SET pms_sync_enabled = ?, updated_at = ? WHERE id = ? AND tenant_id = ?",
        )
        .bind(enabled as i64)
        .bind(fmt_timestamp(&Utc::now()))
        .bind(&id.0)
        .bind(&tenant_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;

    use priceye_core::domain::property::{Property, PropertyId, Strategy, TenantId};

    use crate::repositories::{PropertyRepository, RepositoryError, SqlPropertyRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    pub(crate) async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    pub(crate) fn property(id: &str, tenant: &str) -> Property {
        Property {
            id: PropertyId(id.to_string()),
            tenant_id: TenantId(tenant.to_string()),
            pms_integration_id: None,
            pms_id: None,
            name: format!("Property {id}"),
            city: "Lisbon".to_string(),
            property_type: "apartment".to_string(),
            currency: "EUR".to_string(),
            tz_offset_minutes: 60,
            base_price: 10_000,
            floor_price: 8_000,
            ceiling_price: Some(20_000),
            strategy: Strategy::Balanced,
            pricing_enabled: true,
            pms_sync_enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let pool = setup_pool().await;
        let repo = SqlPropertyRepository::new(pool.clone());
        let tenant = TenantId("T-1".to_string());

        repo.save(property("P-1", "T-1")).await.expect("save");
        let fetched = repo
            .find(&tenant, &PropertyId("P-1".to_string()))
            .await
            .expect("find")
            .expect("property exists");

        assert_eq!(fetched.name, "Property P-1");
        assert_eq!(fetched.strategy, Strategy::Balanced);
        assert_eq!(fetched.ceiling_price, Some(20_000));
        assert_eq!(fetched.tz_offset_minutes, 60);
    }

    #[tokio::test]
    async fn cross_tenant_read_is_a_scope_violation() {
        let pool = setup_pool().await;
        let repo = SqlPropertyRepository::new(pool.clone());

        repo.save(property("P-1", "T-1")).await.expect("save");
        let error = repo
            .find(&TenantId("T-2".to_string()), &PropertyId("P-1".to_string()))
            .await
            .expect_err("cross-tenant access");

        assert!(matches!(error, RepositoryError::TenantScope { .. }));
    }

    #[tokio::test]
    async fn save_rejects_invalid_property() {
        let pool = setup_pool().await;
        let repo = SqlPropertyRepository::new(pool.clone());

        let mut bad = property("P-1", "T-1");
        bad.base_price = 0;

        assert!(matches!(repo.save(bad).await, Err(RepositoryError::Domain(_))));
    }

    #[tokio::test]
    async fn upsert_updates_in_place() {
        let pool = setup_pool().await;
        let repo = SqlPropertyRepository::new(pool.clone());
        let tenant = TenantId("T-1".to_string());

        repo.save(property("P-1", "T-1")).await.expect("insert");
        let mut updated = property("P-1", "T-1");
        updated.base_price = 11_000;
        updated.strategy = Strategy::Aggressive;
        repo.save(updated).await.expect("update");

        let fetched = repo
            .find(&tenant, &PropertyId("P-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(fetched.base_price, 11_000);
        assert_eq!(fetched.strategy, Strategy::Aggressive);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM properties")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn sync_toggle_only_touches_own_tenant() {
        let pool = setup_pool().await;
        let repo = SqlPropertyRepository::new(pool.clone());
        let owner = TenantId("T-1".to_string());
        let id = PropertyId("P-1".to_string());

        repo.save(property("P-1", "T-1")).await.expect("save");
        repo.set_pms_sync_enabled(&TenantId("T-2".to_string()), &id, false)
            .await
            .expect("no-op for other tenant");

        let fetched = repo.find(&owner, &id).await.expect("find").expect("exists");
        assert!(fetched.pms_sync_enabled, "other tenant must not toggle sync");

        repo.set_pms_sync_enabled(&owner, &id, false).await.expect("toggle");
        let fetched = repo.find(&owner, &id).await.expect("find").expect("exists");
        assert!(!fetched.pms_sync_enabled);
    }
}
