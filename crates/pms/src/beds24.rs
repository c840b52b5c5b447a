//! Beds24 adapter. The API is JSON-RPC flavoured: every operation is a POST
//! of a JSON body carrying an `authentication` object. Bookings report the
//! last occupied night inclusively; normalization to the half-open interval
//! happens here and nowhere else.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde_json::{json, Value};
use tracing::debug;

use crate::adapter::{
    classify_status, transport_error, PmsAdapter, PmsError, PropertySettings, PushOutcome,
    RateUpdate, RemoteProperty, Reservation,
};

const DEFAULT_BASE_URL: &str = "https://api.beds24.com";

pub struct Beds24Adapter {
    client: reqwest::Client,
    base_url: String,
}

impl Beds24Adapter {
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

    async fn call(&self, method: &str, body: Value) -> Result<Value, PmsError> {
        let url = format!("{}/json/{method}", self.base_url);
        debug!(event_name = "pms.beds24.call", method, "calling beds24");

        let response =
            self.client.post(&url).json(&body).send().await.map_err(transport_error)?;
        if let Some(error) = classify_status(response.status()) {
            return Err(error);
        }

        response.json::<Value>().await.map_err(transport_error)
    }
}

fn authentication(credentials: &Value) -> Result<Value, PmsError> {
    let api_key = credentials
        .get("api_key")
        .and_then(Value::as_str)
        .ok_or_else(|| PmsError::Protocol("beds24 credentials missing api_key".to_string()))?;
    let prop_key = credentials
        .get("prop_key")
        .and_then(Value::as_str)
        .ok_or_else(|| PmsError::Protocol("beds24 credentials missing prop_key".to_string()))?;

    Ok(json!({ "apiKey": api_key, "propKey": prop_key }))
}

fn parse_date(payload: &Value, field: &str) -> Result<NaiveDate, PmsError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<NaiveDate>().ok())
        .ok_or_else(|| PmsError::Protocol(format!("beds24 booking missing {field}")))
}

pub(crate) fn parse_properties(payload: &Value) -> Result<Vec<RemoteProperty>, PmsError> {
    let rows = payload
        .get("getProperties")
        .and_then(Value::as_array)
        .ok_or_else(|| PmsError::Protocol("beds24 getProperties payload malformed".to_string()))?;

    rows.iter()
        .map(|row| {
            let pms_id = row
                .get("propId")
                .and_then(Value::as_str)
                .ok_or_else(|| PmsError::Protocol("beds24 property missing propId".to_string()))?;
            Ok(RemoteProperty {
                pms_id: pms_id.to_string(),
                name: row.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                city: row.get("city").and_then(Value::as_str).map(str::to_string),
                currency: row.get("currency").and_then(Value::as_str).map(str::to_string),
            })
        })
        .collect()
}

/// Beds24 reports `firstNight`/`lastNight` where both nights are occupied.
/// Checkout day is `lastNight + 1`.
pub(crate) fn parse_bookings(payload: &Value) -> Result<Vec<Reservation>, PmsError> {
    let rows = payload
        .get("getBookings")
        .and_then(Value::as_array)
        .ok_or_else(|| PmsError::Protocol("beds24 getBookings payload malformed".to_string()))?;

    rows.iter()
        .map(|row| {
            let booking_id = row
                .get("bookId")
                .and_then(Value::as_str)
                .ok_or_else(|| PmsError::Protocol("beds24 booking missing bookId".to_string()))?;
            let first_night = parse_date(row, "firstNight")?;
            let last_night = parse_date(row, "lastNight")?;
            let end_date_exclusive = last_night
                .checked_add_days(Days::new(1))
                .ok_or_else(|| PmsError::Protocol("beds24 lastNight out of range".to_string()))?;

            Ok(Reservation {
                pms_booking_id: booking_id.to_string(),
                start_date: first_night,
                end_date_exclusive,
                price_per_night: row.get("rate").and_then(Value::as_i64),
                channel: row
                    .get("referer")
                    .and_then(Value::as_str)
                    .unwrap_or("direct")
                    .to_string(),
            })
        })
        .collect()
}

pub(crate) fn parse_set_rates_outcome(
    payload: &Value,
    rates: &[RateUpdate],
) -> Result<PushOutcome, PmsError> {
    let rows = payload
        .get("setRates")
        .and_then(Value::as_array)
        .ok_or_else(|| PmsError::Protocol("beds24 setRates payload malformed".to_string()))?;

    let mut outcome = PushOutcome::default();
    for (index, rate) in rates.iter().enumerate() {
        match rows.get(index) {
            Some(row) if row.get("success").and_then(Value::as_bool) == Some(true) => {
                outcome.record_ok();
            }
            Some(row) => {
                let reason =
                    row.get("error").and_then(Value::as_str).unwrap_or("rejected").to_string();
                outcome.record_failure(rate.date, reason);
            }
            None => outcome.record_failure(rate.date, "missing response entry"),
        }
    }
    Ok(outcome)
}

#[async_trait]
impl PmsAdapter for Beds24Adapter {
    async fn test_connection(&self, credentials: &Value) -> Result<(), PmsError> {
        let body = json!({ "authentication": authentication(credentials)? });
        self.call("getProperties", body).await.map(|_| ())
    }

    async fn list_properties(&self, credentials: &Value) -> Result<Vec<RemoteProperty>, PmsError> {
        let body = json!({ "authentication": authentication(credentials)? });
        let payload = self.call("getProperties", body).await?;
        parse_properties(&payload)
    }

    async fn fetch_reservations(
        &self,
        credentials: &Value,
        pms_property_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Reservation>, PmsError> {
        let body = json!({
            "authentication": authentication(credentials)?,
            "propId": pms_property_id,
            "arrivalFrom": from.to_string(),
            "arrivalTo": to.to_string(),
        });
        let payload = self.call("getBookings", body).await?;
        parse_bookings(&payload)
    }

    async fn push_rates(
        &self,
        credentials: &Value,
        pms_property_id: &str,
        rates: &[RateUpdate],
    ) -> Result<PushOutcome, PmsError> {
        let entries: Vec<Value> = rates
            .iter()
            .map(|rate| json!({ "date": rate.date.to_string(), "price": rate.price }))
            .collect();
        let body = json!({
            "authentication": authentication(credentials)?,
            "propId": pms_property_id,
            "rates": entries,
        });
        let payload = self.call("setRates", body).await?;
        parse_set_rates_outcome(&payload, rates)
    }

    async fn update_property_settings(
        &self,
        credentials: &Value,
        pms_property_id: &str,
        settings: &PropertySettings,
    ) -> Result<(), PmsError> {
        let body = json!({
            "authentication": authentication(credentials)?,
            "propId": pms_property_id,
            "minPrice": settings.min_price,
            "maxPrice": settings.max_price,
        });
        self.call("setProperty", body).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use crate::adapter::RateUpdate;

    use super::{parse_bookings, parse_properties, parse_set_rates_outcome};

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid test date")
    }

    #[test]
    fn inclusive_checkout_is_normalized_to_half_open() {
        let payload = json!({
            "getBookings": [{
                "bookId": "BK-1",
                "firstNight": "2025-06-01",
                "lastNight": "2025-06-03",
                "rate": 12000,
                "referer": "airbnb"
            }]
        });

        let bookings = parse_bookings(&payload).expect("parse");
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].start_date, date("2025-06-01"));
        // last occupied night 06-03 means checkout on 06-04.
        assert_eq!(bookings[0].end_date_exclusive, date("2025-06-04"));
        assert_eq!(bookings[0].price_per_night, Some(12_000));
    }

    #[test]
    fn properties_payload_maps_to_remote_properties() {
        let payload = json!({
            "getProperties": [
                { "propId": "101", "name": "Loft", "city": "Lisbon", "currency": "EUR" },
                { "propId": "102", "name": "Villa" }
            ]
        });

        let properties = parse_properties(&payload).expect("parse");
        assert_eq!(properties.len(), 2);
        assert_eq!(properties[0].pms_id, "101");
        assert_eq!(properties[1].city, None);
    }

    #[test]
    fn partial_rate_rejection_is_an_outcome_not_an_error() {
        let rates = vec![
            RateUpdate { date: date("2025-06-01"), price: 12_000 },
            RateUpdate { date: date("2025-06-02"), price: 12_500 },
        ];
        let payload = json!({
            "setRates": [
                { "success": true },
                { "success": false, "error": "date closed" }
            ]
        });

        let outcome = parse_set_rates_outcome(&payload, &rates).expect("parse");
        assert_eq!(outcome.ok_count, 1);
        assert_eq!(outcome.failed_dates, vec![(date("2025-06-02"), "date closed".to_string())]);
        assert!(!outcome.is_complete());
    }

    #[test]
    fn malformed_payload_is_a_protocol_error() {
        assert!(parse_bookings(&json!({ "unexpected": [] })).is_err());
    }
}
