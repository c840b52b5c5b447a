use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use priceye_core::domain::group::GroupId;
use priceye_core::domain::property::{PropertyId, TenantId};
use priceye_core::domain::status::{AutoPricingStatus, EntityRef, RunState};

use crate::repositories::codec::{fmt_timestamp, parse_timestamp};
use crate::repositories::{AutoPricingRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAutoPricingRepository {
    pool: DbPool,
}

impl SqlAutoPricingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow) -> Result<AutoPricingStatus, RepositoryError> {
        let entity_type: String = row.try_get("entity_type")?;
        let entity_id: String = row.try_get("entity_id")?;
        let run_state_raw: String = row.try_get("run_state")?;
        let last_run_at_raw: Option<String> = row.try_get("last_run_at")?;

        let entity = match entity_type.as_str() {
            "property" => EntityRef::Property(PropertyId(entity_id)),
            "group" => EntityRef::Group(GroupId(entity_id)),
            other => {
                return Err(RepositoryError::Decode(format!("unknown entity type `{other}`")))
            }
        };

        Ok(AutoPricingStatus {
            entity,
            tenant_id: TenantId(row.try_get("tenant_id")?),
            enabled: row.try_get::<i64, _>("enabled")? != 0,
            run_state: RunState::parse(&run_state_raw)?,
            last_run_at: last_run_at_raw
                .map(|raw| parse_timestamp("auto_pricing_status.last_run_at", &raw))
                .transpose()?,
            last_error: row.try_get("last_error")?,
        })
    }
}

#[async_trait]
impl AutoPricingRepository for SqlAutoPricingRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        entity: &EntityRef,
    ) -> Result<Option<AutoPricingStatus>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM auto_pricing_status WHERE entity_type = ? AND entity_id = ?",
        )
        .bind(entity.entity_type().as_str())
        .bind(entity.entity_id())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let status = Self::from_row(&row)?;
                if status.tenant_id != *tenant_id {
                    return Err(RepositoryError::TenantScope { tenant_id: tenant_id.clone() });
                }
                Ok(Some(status))
            }
        }
    }

    async fn list_enabled(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<AutoPricingStatus>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM auto_pricing_status WHERE tenant_id = ? AND enabled = 1 ORDER BY entity_type, entity_id",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_tenants_with_enabled_entities(&self) -> Result<Vec<TenantId>, RepositoryError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT tenant_id FROM auto_pricing_status WHERE enabled = 1 ORDER BY tenant_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TenantId).collect())
    }

    async fn save(&self, status: AutoPricingStatus) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO auto_pricing_status (
                entity_type, entity_id, tenant_id, enabled, run_state, last_run_at, last_error
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (entity_type, entity_id) DO UPDATE SET
                enabled = excluded.enabled,
                run_state = excluded.run_state,
                last_run_at = excluded.last_run_at,
                last_error = excluded.last_error
            "#,
        )
        .bind(status.entity.entity_type().as_str())
        .bind(status.entity.entity_id())
        .bind(&status.tenant_id.0)
        .bind(status.enabled as i64)
        .bind(status.run_state.as_str())
        .bind(status.last_run_at.as_ref().map(fmt_timestamp))
        .bind(&status.last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use priceye_core::domain::group::GroupId;
    use priceye_core::domain::property::{PropertyId, TenantId};
    use priceye_core::domain::status::{AutoPricingStatus, EntityRef, RunState};

    use crate::repositories::property::tests::setup_pool;
    use crate::repositories::{AutoPricingRepository, RepositoryError, SqlAutoPricingRepository};

    fn property_status(id: &str, tenant: &str, enabled: bool) -> AutoPricingStatus {
        AutoPricingStatus::new(
            EntityRef::Property(PropertyId(id.to_string())),
            TenantId(tenant.to_string()),
            enabled,
        )
    }

    #[tokio::test]
    async fn state_machine_round_trips_through_the_table() {
        let pool = setup_pool().await;
        let repo = SqlAutoPricingRepository::new(pool);
        let tenant = TenantId("T-1".to_string());
        let entity = EntityRef::Property(PropertyId("P-1".to_string()));

        let mut status = property_status("P-1", "T-1", true);
        status.transition_to(RunState::Running).expect("idle -> running");
        repo.save(status.clone()).await.expect("save running");

        status.transition_to(RunState::Failed).expect("running -> failed");
        status.last_error = Some("pms timeout".to_string());
        status.last_run_at = Some(Utc::now());
        repo.save(status).await.expect("save failed");

        let fetched = repo.find(&tenant, &entity).await.expect("find").expect("exists");
        assert_eq!(fetched.run_state, RunState::Failed);
        assert_eq!(fetched.last_error.as_deref(), Some("pms timeout"));
        assert!(fetched.last_run_at.is_some());
    }

    #[tokio::test]
    async fn enabled_listing_is_tenant_scoped() {
        let pool = setup_pool().await;
        let repo = SqlAutoPricingRepository::new(pool);

        repo.save(property_status("P-1", "T-1", true)).await.expect("save");
        repo.save(property_status("P-2", "T-1", false)).await.expect("save");
        repo.save(property_status("P-3", "T-2", true)).await.expect("save");
        repo.save(AutoPricingStatus::new(
            EntityRef::Group(GroupId("G-1".to_string())),
            TenantId("T-1".to_string()),
            true,
        ))
        .await
        .expect("save group");

        let enabled = repo.list_enabled(&TenantId("T-1".to_string())).await.expect("list");
        let ids: Vec<&str> = enabled.iter().map(|s| s.entity.entity_id()).collect();
        assert_eq!(ids, vec!["G-1", "P-1"]);

        let tenants = repo.list_tenants_with_enabled_entities().await.expect("tenants");
        assert_eq!(tenants.len(), 2);
    }

    #[tokio::test]
    async fn cross_tenant_status_read_is_a_scope_violation() {
        let pool = setup_pool().await;
        let repo = SqlAutoPricingRepository::new(pool);

        repo.save(property_status("P-1", "T-1", true)).await.expect("save");
        let error = repo
            .find(&TenantId("T-2".to_string()), &EntityRef::Property(PropertyId("P-1".to_string())))
            .await
            .expect_err("cross-tenant read");

        assert!(matches!(error, RepositoryError::TenantScope { .. }));
    }
}
