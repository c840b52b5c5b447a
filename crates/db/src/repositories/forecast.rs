use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Row;

use priceye_core::domain::forecast::DemandForecast;

use crate::repositories::codec::parse_date;
use crate::repositories::{ForecastRepository, RepositoryError};
use crate::DbPool;

pub struct SqlForecastRepository {
    pool: DbPool,
}

impl SqlForecastRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ForecastRepository for SqlForecastRepository {
    async fn list_range(
        &self,
        city: &str,
        property_type: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DemandForecast>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT city, property_type, forecast_date, demand_score
            FROM demand_forecasts
            WHERE city = ? AND property_type = ? AND forecast_date >= ? AND forecast_date < ?
            ORDER BY forecast_date
            "#,
        )
        .bind(city)
        .bind(property_type)
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let date_raw: String = row.try_get("forecast_date")?;
                Ok(DemandForecast {
                    city: row.try_get("city")?,
                    property_type: row.try_get("property_type")?,
                    forecast_date: parse_date("demand_forecasts.forecast_date", &date_raw)?,
                    demand_score: row.try_get("demand_score")?,
                })
            })
            .collect()
    }

    async fn upsert_many(&self, forecasts: Vec<DemandForecast>) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for forecast in forecasts {
            sqlx::query(
                r#"
                INSERT INTO demand_forecasts (city, property_type, forecast_date, demand_score)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (city, property_type, forecast_date) DO UPDATE SET
                    demand_score = excluded.demand_score
                "#,
            )
            .bind(&forecast.city)
            .bind(&forecast.property_type)
            .bind(forecast.forecast_date.to_string())
            .bind(forecast.demand_score)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use priceye_core::domain::forecast::DemandForecast;

    use crate::repositories::property::tests::setup_pool;
    use crate::repositories::{ForecastRepository, SqlForecastRepository};

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid test date")
    }

    fn forecast(city: &str, day: &str, score: f64) -> DemandForecast {
        DemandForecast {
            city: city.to_string(),
            property_type: "apartment".to_string(),
            forecast_date: date(day),
            demand_score: score,
        }
    }

    #[tokio::test]
    async fn list_is_scoped_to_market_and_range() {
        let pool = setup_pool().await;
        let repo = SqlForecastRepository::new(pool);

        repo.upsert_many(vec![
            forecast("Lisbon", "2025-06-02", 85.0),
            forecast("Lisbon", "2025-06-20", 55.0),
            forecast("Porto", "2025-06-02", 70.0),
        ])
        .await
        .expect("write");

        let fetched = repo
            .list_range("Lisbon", "apartment", date("2025-06-01"), date("2025-06-10"))
            .await
            .expect("list");

        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].demand_score, 85.0);
        assert_eq!(fetched[0].normalized_score(), 0.85);
    }

    #[tokio::test]
    async fn refresh_overwrites_the_same_cell() {
        let pool = setup_pool().await;
        let repo = SqlForecastRepository::new(pool);

        repo.upsert_many(vec![forecast("Lisbon", "2025-06-02", 85.0)]).await.expect("first");
        repo.upsert_many(vec![forecast("Lisbon", "2025-06-02", 42.0)]).await.expect("refresh");

        let fetched = repo
            .list_range("Lisbon", "apartment", date("2025-06-01"), date("2025-06-10"))
            .await
            .expect("list");
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].demand_score, 42.0);
    }
}
