//! Cloudbeds adapter: REST with an OAuth bearer token supplied through the
//! integration credentials (the token refresh flow lives outside the engine).

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::debug;

use crate::adapter::{
    classify_status, transport_error, PmsAdapter, PmsError, PropertySettings, PushOutcome,
    RateUpdate, RemoteProperty, Reservation,
};

const DEFAULT_BASE_URL: &str = "https://hotels.cloudbeds.com/api/v1.1";

pub struct CloudbedsAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl CloudbedsAdapter {
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

    fn bearer(credentials: &Value) -> Result<&str, PmsError> {
        credentials.get("access_token").and_then(Value::as_str).ok_or_else(|| {
            PmsError::Protocol("cloudbeds credentials missing access_token".to_string())
        })
    }

    async fn get(&self, credentials: &Value, path: &str) -> Result<Value, PmsError> {
        let url = format!("{}{path}", self.base_url);
        debug!(event_name = "pms.cloudbeds.get", path, "calling cloudbeds");

        let response = self
            .client
            .get(&url)
            .bearer_auth(Self::bearer(credentials)?)
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
        debug!(event_name = "pms.cloudbeds.post", path, "calling cloudbeds");

        let response = self
            .client
            .post(&url)
            .bearer_auth(Self::bearer(credentials)?)
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

pub(crate) fn parse_hotels(payload: &Value) -> Result<Vec<RemoteProperty>, PmsError> {
    let rows = payload
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| PmsError::Protocol("cloudbeds getHotels payload malformed".to_string()))?;

    rows.iter()
        .map(|row| {
            let id = row.get("propertyID").and_then(Value::as_str).ok_or_else(|| {
                PmsError::Protocol("cloudbeds hotel missing propertyID".to_string())
            })?;
            Ok(RemoteProperty {
                pms_id: id.to_string(),
                name: row
                    .get("propertyName")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                city: row.get("propertyCity").and_then(Value::as_str).map(str::to_string),
                currency: row
                    .pointer("/propertyCurrency/currencyCode")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}

pub(crate) fn parse_reservations(payload: &Value) -> Result<Vec<Reservation>, PmsError> {
    let rows = payload.get("data").and_then(Value::as_array).ok_or_else(|| {
        PmsError::Protocol("cloudbeds getReservations payload malformed".to_string())
    })?;

    rows.iter()
        .map(|row| {
            let id = row.get("reservationID").and_then(Value::as_str).ok_or_else(|| {
                PmsError::Protocol("cloudbeds reservation missing reservationID".to_string())
            })?;
            let checkin = row
                .get("startDate")
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse::<NaiveDate>().ok())
                .ok_or_else(|| {
                    PmsError::Protocol("cloudbeds reservation missing startDate".to_string())
                })?;
            let checkout = row
                .get("endDate")
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse::<NaiveDate>().ok())
                .ok_or_else(|| {
                    PmsError::Protocol("cloudbeds reservation missing endDate".to_string())
                })?;

            Ok(Reservation {
                pms_booking_id: id.to_string(),
                start_date: checkin,
                // endDate is the checkout day, already exclusive.
                end_date_exclusive: checkout,
                price_per_night: row.get("nightlyRate").and_then(Value::as_i64),
                channel: row
                    .get("sourceName")
                    .and_then(Value::as_str)
                    .unwrap_or("direct")
                    .to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl PmsAdapter for CloudbedsAdapter {
    async fn test_connection(&self, credentials: &Value) -> Result<(), PmsError> {
        self.get(credentials, "/userinfo").await.map(|_| ())
    }

    async fn list_properties(&self, credentials: &Value) -> Result<Vec<RemoteProperty>, PmsError> {
        let payload = self.get(credentials, "/getHotels").await?;
        parse_hotels(&payload)
    }

    async fn fetch_reservations(
        &self,
        credentials: &Value,
        pms_property_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Reservation>, PmsError> {
        let path = format!(
            "/getReservations?propertyID={pms_property_id}&checkInFrom={from}&checkInTo={to}"
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
                "propertyID": pms_property_id,
                "startDate": rate.date.to_string(),
                "endDate": rate.date.to_string(),
                "rate": rate.price,
            });

            match self.post(credentials, "/putRate", body).await {
                Ok(payload) if payload.get("success").and_then(Value::as_bool) == Some(false) => {
                    let reason = payload
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("rejected")
                        .to_string();
                    outcome.record_failure(rate.date, reason);
                }
                Ok(_) => outcome.record_ok(),
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
    use serde_json::json;

    use super::{parse_hotels, parse_reservations};

    #[test]
    fn hotels_payload_maps_nested_currency() {
        let payload = json!({
            "data": [{
                "propertyID": "H-9",
                "propertyName": "Harbour House",
                "propertyCity": "Faro",
                "propertyCurrency": { "currencyCode": "EUR" }
            }]
        });

        let properties = parse_hotels(&payload).expect("parse");
        assert_eq!(properties[0].pms_id, "H-9");
        assert_eq!(properties[0].currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn reservation_checkout_stays_exclusive() {
        let payload = json!({
            "data": [{
                "reservationID": "R-1",
                "startDate": "2025-06-01",
                "endDate": "2025-06-05",
                "sourceName": "expedia"
            }]
        });

        let reservations = parse_reservations(&payload).expect("parse");
        assert_eq!(reservations[0].end_date_exclusive.to_string(), "2025-06-05");
        assert_eq!(reservations[0].channel, "expedia");
    }
}
