use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use priceye_core::domain::integration::{IntegrationId, PmsIntegration};
use priceye_core::domain::property::TenantId;

use crate::repositories::{IntegrationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlIntegrationRepository {
    pool: DbPool,
}

impl SqlIntegrationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow) -> Result<PmsIntegration, RepositoryError> {
        let credentials_raw: String = row.try_get("credentials_json")?;
        let credentials = serde_json::from_str(&credentials_raw).map_err(|error| {
            RepositoryError::Decode(format!("invalid credentials_json: {error}"))
        })?;

        Ok(PmsIntegration {
            id: IntegrationId(row.try_get("id")?),
            tenant_id: TenantId(row.try_get("tenant_id")?),
            integration_type: row.try_get("integration_type")?,
            credentials,
            active: row.try_get::<i64, _>("active")? != 0,
        })
    }
}

#[async_trait]
impl IntegrationRepository for SqlIntegrationRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &IntegrationId,
    ) -> Result<Option<PmsIntegration>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM pms_integrations WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let integration = Self::from_row(&row)?;
                if integration.tenant_id != *tenant_id {
                    return Err(RepositoryError::TenantScope { tenant_id: tenant_id.clone() });
                }
                Ok(Some(integration))
            }
        }
    }

    async fn save(&self, integration: PmsIntegration) -> Result<(), RepositoryError> {
        let credentials_json = serde_json::to_string(&integration.credentials)
            .map_err(|error| RepositoryError::Decode(format!("encode credentials: {error}")))?;

        sqlx::query(
            r#"
            INSERT INTO pms_integrations (id, tenant_id, integration_type, credentials_json, active)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                integration_type = excluded.integration_type,
                credentials_json = excluded.credentials_json,
                active = excluded.active
            "#,
        )
        .bind(&integration.id.0)
        .bind(&integration.tenant_id.0)
        .bind(&integration.integration_type)
        .bind(credentials_json)
        .bind(integration.active as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_active(
        &self,
        tenant_id: &TenantId,
        id: &IntegrationId,
        active: bool,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE pms_integrations SET active = ? WHERE id = ? AND tenant_id = ?")
            .bind(active as i64)
            .bind(&id.0)
            .bind(&tenant_id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use priceye_core::domain::integration::{IntegrationId, PmsIntegration};
    use priceye_core::domain::property::TenantId;

    use crate::repositories::property::tests::setup_pool;
    use crate::repositories::{IntegrationRepository, SqlIntegrationRepository};

    fn integration(id: &str) -> PmsIntegration {
        PmsIntegration {
            id: IntegrationId(id.to_string()),
            tenant_id: TenantId("T-1".to_string()),
            integration_type: "beds24".to_string(),
            credentials: json!({"api_key": "k", "prop_key": "p"}),
            active: true,
        }
    }

    #[tokio::test]
    async fn credentials_stay_opaque_json() {
        let pool = setup_pool().await;
        let repo = SqlIntegrationRepository::new(pool);
        let tenant = TenantId("T-1".to_string());

        repo.save(integration("I-1")).await.expect("save");
        let fetched = repo
            .find(&tenant, &IntegrationId("I-1".to_string()))
            .await
            .expect("find")
            .expect("exists");

        assert_eq!(fetched.integration_type, "beds24");
        assert_eq!(fetched.credentials["api_key"], "k");
        assert!(fetched.active);
    }

    #[tokio::test]
    async fn deactivation_pauses_the_integration() {
        let pool = setup_pool().await;
        let repo = SqlIntegrationRepository::new(pool);
        let tenant = TenantId("T-1".to_string());
        let id = IntegrationId("I-1".to_string());

        repo.save(integration("I-1")).await.expect("save");
        repo.set_active(&tenant, &id, false).await.expect("deactivate");

        let fetched = repo.find(&tenant, &id).await.expect("find").expect("exists");
        assert!(!fetched.active);
    }
}
