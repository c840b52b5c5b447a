use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use priceye_core::domain::group::{Group, GroupId};
use priceye_core::domain::property::{PropertyId, TenantId};

use crate::repositories::codec::{fmt_timestamp, parse_timestamp};
use crate::repositories::{GroupRepository, RepositoryError};
use crate::DbPool;

pub struct SqlGroupRepository {
    pool: DbPool,
}

impl SqlGroupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow, members: Vec<PropertyId>) -> Result<Group, RepositoryError> {
        let created_at_raw: String = row.try_get("created_at")?;
        let updated_at_raw: String = row.try_get("updated_at")?;

        Ok(Group {
            id: GroupId(row.try_get("id")?),
            tenant_id: TenantId(row.try_get("tenant_id")?),
            name: row.try_get("name")?,
            main_property_id: row
                .try_get::<Option<String>, _>("main_property_id")?
                .map(PropertyId),
            member_property_ids: members,
            sync_prices: row.try_get::<i64, _>("sync_prices")? != 0,
            created_at: parse_timestamp("groups.created_at", &created_at_raw)?,
            updated_at: parse_timestamp("groups.updated_at", &updated_at_raw)?,
        })
    }

    async fn members_of(&self, group_id: &GroupId) -> Result<Vec<PropertyId>, RepositoryError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT property_id FROM group_members WHERE group_id = ? ORDER BY rowid",
        )
        .bind(&group_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PropertyId).collect())
    }

    async fn sibling_member_sets(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<(GroupId, Vec<PropertyId>)>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT gm.group_id, gm.property_id
            FROM group_members gm
            JOIN groups g ON g.id = gm.group_id
            WHERE g.tenant_id = ?
            ORDER BY gm.group_id, gm.rowid
            "#,
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut sets: Vec<(GroupId, Vec<PropertyId>)> = Vec::new();
        for row in rows {
            let group_id = GroupId(row.try_get("group_id")?);
            let property_id = PropertyId(row.try_get("property_id")?);
            match sets.last_mut() {
                Some((last_id, members)) if *last_id == group_id => members.push(property_id),
                _ => sets.push((group_id, vec![property_id])),
            }
        }
        Ok(sets)
    }
}

#[async_trait]
impl GroupRepository for SqlGroupRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &GroupId,
    ) -> Result<Option<Group>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM groups WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let owner: String = row.try_get("tenant_id")?;
                if owner != tenant_id.0 {
                    return Err(RepositoryError::TenantScope { tenant_id: tenant_id.clone() });
                }
                let members = self.members_of(id).await?;
                Ok(Some(Self::from_row(&row, members)?))
            }
        }
    }

    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Group>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM groups WHERE tenant_id = ? ORDER BY id")
            .bind(&tenant_id.0)
            .fetch_all(&self.pool)
            .await?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let id = GroupId(row.try_get("id")?);
            let members = self.members_of(&id).await?;
            groups.push(Self::from_row(&row, members)?);
        }
        Ok(groups)
    }

    async fn save(&self, group: Group) -> Result<(), RepositoryError> {
        let siblings = self.sibling_member_sets(&group.tenant_id).await?;
        group.validate(&siblings)?;

        let existing_owner: Option<String> =
            sqlx::query_scalar("SELECT tenant_id FROM groups WHERE id = ?")
                .bind(&group.id.0)
                .fetch_optional(&self.pool)
                .await?;
        if let Some(owner) = existing_owner {
            if owner != group.tenant_id.0 {
                return Err(RepositoryError::TenantScope { tenant_id: group.tenant_id });
            }
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO groups (id, tenant_id, name, main_property_id, sync_prices, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                main_property_id = excluded.main_property_id,
                sync_prices = excluded.sync_prices,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&group.id.0)
        .bind(&group.tenant_id.0)
        .bind(&group.name)
        .bind(group.main_property_id.as_ref().map(|id| id.0.clone()))
        .bind(group.sync_prices as i64)
        .bind(fmt_timestamp(&group.created_at))
        .bind(fmt_timestamp(&group.updated_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM group_members WHERE group_id = ?")
            .bind(&group.id.0)
            .execute(&mut *tx)
            .await?;

        for member in &group.member_property_ids {
            sqlx::query("INSERT INTO group_members (group_id, property_id) VALUES (?, ?)")
                .bind(&group.id.0)
                .bind(&member.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
