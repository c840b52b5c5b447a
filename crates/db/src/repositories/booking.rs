use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use priceye_core::domain::booking::{Booking, BookingId};
use priceye_core::domain::property::{PropertyId, TenantId};
use priceye_core::errors::DomainError;

use crate::repositories::codec::{fmt_timestamp, parse_date, parse_timestamp};
use crate::repositories::{BookingRepository, RepositoryError};
use crate::DbPool;

pub struct SqlBookingRepository {
    pool: DbPool,
}

impl SqlBookingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow) -> Result<Booking, RepositoryError> {
        let start_raw: String = row.try_get("start_date")?;
        let end_raw: String = row.try_get("end_date_exclusive")?;
        let booked_at_raw: String = row.try_get("booked_at")?;

        Ok(Booking {
            id: BookingId(row.try_get("id")?),
            property_id: PropertyId(row.try_get("property_id")?),
            start_date: parse_date("bookings.start_date", &start_raw)?,
            end_date_exclusive: parse_date("bookings.end_date_exclusive", &end_raw)?,
            price_per_night: row.try_get("price_per_night")?,
            channel: row.try_get("channel")?,
            booked_at: parse_timestamp("bookings.booked_at", &booked_at_raw)?,
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
impl BookingRepository for SqlBookingRepository {
    async fn insert(&self, tenant_id: &TenantId, booking: Booking) -> Result<(), RepositoryError> {
        booking.validate()?;
        self.check_tenant(tenant_id, &booking.property_id).await?;

        let mut tx = self.pool.begin().await?;

        // Half-open interval overlap against existing stays.
        let overlapping: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM bookings
            WHERE property_id = ? AND start_date < ? AND end_date_exclusive > ? AND id <> ?
            "#,
        )
        .bind(&booking.property_id.0)
        .bind(booking.end_date_exclusive.to_string())
        .bind(booking.start_date.to_string())
        .bind(&booking.id.0)
        .fetch_one(&mut *tx)
        .await?;

        if overlapping > 0 {
            return Err(RepositoryError::Domain(DomainError::BookingOverlap {
                property_id: booking.property_id,
            }));
        }

        sqlx::query(
            r#"
            INSERT INTO bookings (id, property_id, start_date, end_date_exclusive, price_per_night, channel, booked_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&booking.id.0)
        .bind(&booking.property_id.0)
        .bind(booking.start_date.to_string())
        .bind(booking.end_date_exclusive.to_string())
        .bind(booking.price_per_night)
        .bind(&booking.channel)
        .bind(fmt_timestamp(&booking.booked_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_for_month(
        &self,
        tenant_id: &TenantId,
        property_id: &PropertyId,
        year: i32,
        month: u32,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let from = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid month {year}-{month:02}"))
        })?;
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
        tenant_id: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Booking>, RepositoryError> {
        self.check_tenant(tenant_id, property_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT * FROM bookings
            WHERE property_id = ? AND start_date < ? AND end_date_exclusive > ?
            ORDER BY start_date
            "#,
        )
        .bind(&property_id.0)
        .bind(to.to_string())
        .bind(from.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use priceye_core::domain::booking::{Booking, BookingId};
    use priceye_core::domain::property::{PropertyId, TenantId};
    use priceye_core::errors::DomainError;

    use crate::repositories::property::tests::{property, setup_pool};
    use crate::repositories::{
        BookingRepository, PropertyRepository, RepositoryError, SqlBookingRepository,
        SqlPropertyRepository,
    };

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid test date")
    }

    fn booking(id: &str, start: &str, end: &str) -> Booking {
        Booking {
            id: BookingId(id.to_string()),
            property_id: PropertyId("P-1".to_string()),
            start_date: date(start),
            end_date_exclusive: date(end),
            price_per_night: 12_000,
            channel: "airbnb".to_string(),
            booked_at: Utc::now(),
        }
    }

    async fn setup() -> (crate::DbPool, SqlBookingRepository, TenantId) {
        let pool = setup_pool().await;
        SqlPropertyRepository::new(pool.clone()).save(property("P-1", "T-1")).await.expect("seed");
        let repo = SqlBookingRepository::new(pool.clone());
        (pool, repo, TenantId("T-1".to_string()))
    }

    #[tokio::test]
    async fn back_to_back_stays_are_accepted() {
        let (_pool, repo, tenant) = setup().await;

        repo.insert(&tenant, booking("B-1", "2025-06-01", "2025-06-04")).await.expect("first");
        repo.insert(&tenant, booking("B-2", "2025-06-04", "2025-06-07")).await.expect("adjacent");
    }

    #[tokio::test]
    async fn overlapping_stay_is_rejected() {
        let (_pool, repo, tenant) = setup().await;

        repo.insert(&tenant, booking("B-1", "2025-06-01", "2025-06-05")).await.expect("first");
        let error = repo
            .insert(&tenant, booking("B-2", "2025-06-04", "2025-06-08"))
            .await
            .expect_err("shared night");

        assert!(matches!(
            error,
            RepositoryError::Domain(DomainError::BookingOverlap { .. })
        ));
    }

    #[tokio::test]
    async fn month_listing_includes_stays_spanning_the_boundary() {
        let (_pool, repo, tenant) = setup().await;

        repo.insert(&tenant, booking("B-1", "2025-05-29", "2025-06-02")).await.expect("spanning");
        repo.insert(&tenant, booking("B-2", "2025-06-10", "2025-06-12")).await.expect("inside");
        repo.insert(&tenant, booking("B-3", "2025-07-01", "2025-07-03")).await.expect("after");

        let june = repo
            .list_for_month(&tenant, &PropertyId("P-1".to_string()), 2025, 6)
            .await
            .expect("list june");

        let ids: Vec<&str> = june.iter().map(|b| b.id.0.as_str()).collect();
        assert_eq!(ids, vec!["B-1", "B-2"]);
    }

    #[tokio::test]
    async fn cross_tenant_booking_write_is_rejected() {
        let (_pool, repo, _tenant) = setup().await;

        let error = repo
            .insert(&TenantId("T-2".to_string()), booking("B-1", "2025-06-01", "2025-06-04"))
            .await
            .expect_err("cross-tenant write");

        assert!(matches!(error, RepositoryError::TenantScope { .. }));
    }
}
