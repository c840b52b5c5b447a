//! Smoobu adapter: plain REST with an `Api-Key` header. Reservations already
//! use an exclusive departure date, so no interval normalization is needed.
//! There is no batch rate endpoint; rates are written one date at a time and
//! per-date failures accumulate in the outcome.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::debug;

use crate::adapter::{
    classify_status, transport_error, PmsAdapter, PmsError, PropertySettings, PushOutcome,
    RateUpdate, RemoteProperty, Reservation,
};

const DEFAULT_BASE_URL: &str = "https://login.smoobu.com";

pub struct SmoobuAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl SmoobuAdapter {
    pub fn new(deadline: Duration) -> Self {
        Self::with_base_url(deadline, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(deadline: Duration, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(deadline)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url: base_url.into() }
    }

    fn api_key(credentials: &Value) -> Result<&str, PmsError> {
        credentials
            .get("api_key")
            .and_then(Value::as_str)
            .ok_or_else(|| PmsError::Protocol("smoobu credentials missing api_key".to_string()))
    }

    async fn get(&self, credentials: &Value, path: &str) -> Result<Value, PmsError> {
        let url = format!("{}{path}", self.base_url);
        debug!(event_name = "pms.smoobu.get", path, "calling smoobu");

        let response = self
            .client
            .get(&url)
            .header("Api-Key", Self::api_key(credentials)?)
            .send()
            .await
            .map_err(transport_error)?;
        if let Some(error) = classify_status(response.status()) {
            return Err(error);
        }
        response.json::<Value>().await.map_err(transport_error)
    }

    async fn post(&self, credentials: &Value, path: &str, body: Value) -> Result<Value, PmsError> {
        let url = format!("{}{path}", self.base_url);
        debug!(event_name = "pms.smoobu.post", path, "calling smoobu");

        let response = self
            .client
            .post(&url)
            .header("Api-Key", Self::api_key(credentials)?)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if let Some(error) = classify_status(response.status()) {
            return Err(error);
        }
        response.json::<Value>().await.map_err(transport_error)
    }
}

pub(crate) fn parse_apartments(payload: &Value) -> Result<Vec<RemoteProperty>, PmsError> {
    let rows = payload
        .get("apartments")
        .and_then(Value::as_array)
        .ok_or_else(|| PmsError::Protocol("smoobu apartments payload malformed".to_string()))?;

    rows.iter()
        .map(|row| {
            let id = row
                .get("id")
                .and_then(Value::as_i64)
                .ok_or_else(|| PmsError::Protocol("smoobu apartment missing id".to_string()))?;
            Ok(RemoteProperty {
                pms_id: id.to_string(),
                name: row.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                city: row
                    .pointer("/location/city")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                currency: row.get("currency").and_then(Value::as_str).map(str::to_string),
            })
        })
        .collect()
}

pub(crate) fn parse_reservations(payload: &Value) -> Result<Vec<Reservation>, PmsError> {
    let rows = payload
        .get("bookings")
        .and_then(Value::as_array)
        .ok_or_else(|| PmsError::Protocol("smoobu bookings payload malformed".to_string()))?;

    rows.iter()
        .map(|row| {
            let id = row
                .get("id")
                .and_then(Value::as_i64)
                .ok_or_else(|| PmsError::Protocol("smoobu booking missing id".to_string()))?;
            let arrival = row
                .get("arrival")
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse::<NaiveDate>().ok())
                .ok_or_else(|| PmsError::Protocol("smoobu booking missing arrival".to_string()))?;
            let departure = row
                .get("departure")
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse::<NaiveDate>().ok())
                .ok_or_else(|| {
                    PmsError::Protocol("smoobu booking missing departure".to_string())
                })?;

            Ok(Reservation {
                pms_booking_id: id.to_string(),
                start_date: arrival,
                // departure is already the checkout day.
                end_date_exclusive: departure,
                price_per_night: row.get("price_per_night").and_then(Value::as_i64),
                channel: row
                    .pointer("/channel/name")
                    .and_then(Value::as_str)
                    .unwrap_or("direct")
                    .to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl PmsAdapter for SmoobuAdapter {
    async fn test_connection(&self, credentials: &Value) -> Result<(), PmsError> {
        self.get(credentials, "/api/me").await.map(|_| ())
    }

    async fn list_properties(&self, credentials: &Value) -> Result<Vec<RemoteProperty>, PmsError> {
        let payload = self.get(credentials, "/api/apartments").await?;
        parse_apartments(&payload)
    }

    async fn fetch_reservations(
        &self,
        credentials: &Value,
        pms_property_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Reservation>, PmsError> {
        let path = format!(
            "/api/reservations?apartmentId={pms_property_id}&from={from}&to={to}"
        );
        let payload = self.get(credentials, &path).await?;
        parse_reservations(&payload)
    }

    async fn push_rates(
        &self,
        credentials: &Value,
        pms_property_id: &str,
        rates: &[RateUpdate],
    ) -> Result<PushOutcome, PmsError> {
        let mut outcome = PushOutcome::default();

        for rate in rates {
            let body = json!({
                "apartments": [pms_property_id],
                "operations": [{
                    "dates": [rate.date.to_string()],
                    "daily_price": rate.price,
                }]
            });

            match self.post(credentials, "/api/rates", body).await {
                Ok(_) => outcome.record_ok(),
                // Auth failure poisons the whole property, not one date.
                Err(PmsError::Unauthorized) => return Err(PmsError::Unauthorized),
                Err(error) if error.is_retryable() => return Err(error),
                Err(error) => outcome.record_failure(rate.date, error.to_string()),
            }
        }

        Ok(outcome)
    }

    async fn update_property_settings(
        &self,
        _credentials: &Value,
        _pms_property_id: &str,
        _settings: &PropertySettings,
    ) -> Result<(), PmsError> {
        Err(PmsError::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{parse_apartments, parse_reservations};

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid test date")
    }

    #[test]
    fn departure_is_kept_exclusive_as_is() {
        let payload = json!({
            "bookings": [{
                "id": 77,
                "arrival": "2025-06-01",
                "departure": "2025-06-04",
                "channel": { "name": "booking.com" }
            }]
        });

        let reservations = parse_reservations(&payload).expect("parse");
        assert_eq!(reservations[0].start_date, date("2025-06-01"));
        assert_eq!(reservations[0].end_date_exclusive, date("2025-06-04"));
        assert_eq!(reservations[0].channel, "booking.com");
    }

    #[test]
    fn apartments_map_with_nested_location() {
        let payload = json!({
            "apartments": [{
                "id": 55,
                "name": "Studio",
                "location": { "city": "Porto" },
                "currency": "EUR"
            }]
        });

        let properties = parse_apartments(&payload).expect("parse");
        assert_eq!(properties[0].pms_id, "55");
        assert_eq!(properties[0].city.as_deref(), Some("Porto"));
    }
}
