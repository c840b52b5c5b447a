use async_trait::async_trait;
use sqlx::Row;

use priceye_core::domain::property::TenantId;
use priceye_core::domain::quota::AiQuotaCounter;

use crate::repositories::codec::{fmt_timestamp, parse_timestamp};
use crate::repositories::{QuotaRepository, RepositoryError};
use crate::DbPool;

pub struct SqlQuotaRepository {
    pool: DbPool,
}

impl SqlQuotaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaRepository for SqlQuotaRepository {
    async fn find(&self, tenant_id: &TenantId) -> Result<Option<AiQuotaCounter>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM ai_quota_counters WHERE tenant_id = ?")
            .bind(&tenant_id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let window_start_raw: String = row.try_get("window_start")?;
                Ok(Some(AiQuotaCounter {
                    tenant_id: TenantId(row.try_get("tenant_id")?),
                    window_start: parse_timestamp(
                        "ai_quota_counters.window_start",
                        &window_start_raw,
                    )?,
                    ai_calls_used: row.try_get("ai_calls_used")?,
                    ai_calls_max: row.try_get("ai_calls_max")?,
                }))
            }
        }
    }

    async fn save(&self, counter: AiQuotaCounter) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO ai_quota_counters (tenant_id, window_start, ai_calls_used, ai_calls_max)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (tenant_id) DO UPDATE SET
                window_start = excluded.window_start,
                ai_calls_used = excluded.ai_calls_used,
                ai_calls_max = excluded.ai_calls_max
            "#,
        )
        .bind(&counter.tenant_id.0)
        .bind(fmt_timestamp(&counter.window_start))
        .bind(counter.ai_calls_used)
        .bind(counter.ai_calls_max)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_reserve(
        &self,
        tenant_id: &TenantId,
        amount: i64,
    ) -> Result<bool, RepositoryError> {
        // Single conditional UPDATE: the reservation either fits the budget
        // atomically or leaves the counter untouched. A missing counter row
        // reserves nothing (no configured budget means no LLM calls).
        let result = sqlx::query(
            r#"
            UPDATE ai_quota_counters
            SET ai_calls_used = ai_calls_used + ?
            WHERE tenant_id = ? AND ai_calls_used + ? <= ai_calls_max
            "#,
        )
        .bind(amount)
        .bind(&tenant_id.0)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use priceye_core::domain::property::TenantId;
    use priceye_core::domain::quota::AiQuotaCounter;

    use crate::repositories::property::tests::setup_pool;
    use crate::repositories::{QuotaRepository, SqlQuotaRepository};

    fn counter(used: i64, max: i64) -> AiQuotaCounter {
        AiQuotaCounter {
            tenant_id: TenantId("T-1".to_string()),
            window_start: Utc::now(),
            ai_calls_used: used,
            ai_calls_max: max,
        }
    }

    #[tokio::test]
    async fn reserve_succeeds_until_the_budget_is_exhausted() {
        let pool = setup_pool().await;
        let repo = SqlQuotaRepository::new(pool);
        let tenant = TenantId("T-1".to_string());

        repo.save(counter(0, 5)).await.expect("save");

        assert!(repo.try_reserve(&tenant, 3).await.expect("first reserve"));
        assert!(repo.try_reserve(&tenant, 2).await.expect("second reserve"));
        assert!(!repo.try_reserve(&tenant, 1).await.expect("over budget"));

        let fetched = repo.find(&tenant).await.expect("find").expect("exists");
        assert_eq!(fetched.ai_calls_used, 5);
        assert!(fetched.is_exhausted());
    }

    #[tokio::test]
    async fn failed_reservation_leaves_the_counter_untouched() {
        let pool = setup_pool().await;
        let repo = SqlQuotaRepository::new(pool);
        let tenant = TenantId("T-1".to_string());

        repo.save(counter(8, 10)).await.expect("save");
        assert!(!repo.try_reserve(&tenant, 5).await.expect("too large"));

        let fetched = repo.find(&tenant).await.expect("find").expect("exists");
        assert_eq!(fetched.ai_calls_used, 8);
        assert_eq!(fetched.remaining(), 2);
    }

    #[tokio::test]
    async fn missing_counter_reserves_nothing() {
        let pool = setup_pool().await;
        let repo = SqlQuotaRepository::new(pool);

        assert!(!repo
            .try_reserve(&TenantId("T-ABSENT".to_string()), 1)
            .await
            .expect("no counter row"));
    }
}
