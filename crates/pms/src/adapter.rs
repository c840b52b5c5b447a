//! PMS capability seam. An adapter is a stateless capability record: every
//! call receives the credentials, nothing is cached between calls, and the
//! engine resolves adapters through the registry by integration type name.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use priceye_core::domain::property::Cents;

#[derive(Debug, Error)]
pub enum PmsError {
    /// 401/403 from the PMS. Short-circuits the property and pauses sync.
    #[error("pms rejected the credentials")]
    Unauthorized,
    /// The PMS has no endpoint for this operation.
    #[error("operation not supported by this pms")]
    NotSupported,
    /// Timeouts, connection failures, 408/429/5xx. Retried with backoff.
    #[error("transient pms failure: {0}")]
    Transient(String),
    /// Other 4xx. Not retried.
    #[error("pms rejected the request: {0}")]
    Rejected(String),
    /// The PMS answered with a payload we could not interpret.
    #[error("unexpected pms payload: {0}")]
    Protocol(String),
}

impl PmsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A property as the PMS knows it, used during import.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteProperty {
    pub pms_id: String,
    pub name: String,
    pub city: Option<String>,
    pub currency: Option<String>,
}

/// A reservation normalized to the half-open `[start, end_exclusive)`
/// convention. Feeds that report an inclusive checkout night are normalized
/// inside the adapter, before the value crosses this boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub pms_booking_id: String,
    pub start_date: NaiveDate,
    pub end_date_exclusive: NaiveDate,
    pub price_per_night: Option<Cents>,
    pub channel: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateUpdate {
    pub date: NaiveDate,
    pub price: Cents,
}

/// Per-date outcome of a rate push. Partial failure is data, not an error:
/// only auth and whole-call transport failures surface as `PmsError`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PushOutcome {
    pub ok_count: usize,
    pub failed_dates: Vec<(NaiveDate, String)>,
}

impl PushOutcome {
    pub fn record_ok(&mut self) {
        self.ok_count += 1;
    }

    pub fn record_failure(&mut self, date: NaiveDate, reason: impl Into<String>) {
        self.failed_dates.push((date, reason.into()));
    }

    pub fn is_complete(&self) -> bool {
        self.failed_dates.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySettings {
    pub min_price: Option<Cents>,
    pub max_price: Option<Cents>,
}

#[async_trait]
pub trait PmsAdapter: Send + Sync {
    /// Cheap credential probe, used by doctor checks and integration setup.
    async fn test_connection(&self, credentials: &serde_json::Value) -> Result<(), PmsError>;

    async fn list_properties(
        &self,
        credentials: &serde_json::Value,
    ) -> Result<Vec<RemoteProperty>, PmsError>;

    /// Reservations intersecting `[from, to)`.
    async fn fetch_reservations(
        &self,
        credentials: &serde_json::Value,
        pms_property_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Reservation>, PmsError>;

    async fn push_rates(
        &self,
        credentials: &serde_json::Value,
        pms_property_id: &str,
        rates: &[RateUpdate],
    ) -> Result<PushOutcome, PmsError>;

    async fn update_property_settings(
        &self,
        credentials: &serde_json::Value,
        pms_property_id: &str,
        settings: &PropertySettings,
    ) -> Result<(), PmsError>;
}

/// Maps an HTTP status onto the retry taxonomy shared by all adapters.
pub(crate) fn classify_status(status: reqwest::StatusCode) -> Option<PmsError> {
    if status.is_success() {
        return None;
    }
    Some(match status.as_u16() {
        401 | 403 => PmsError::Unauthorized,
        408 | 429 => PmsError::Transient(format!("status {status}")),
        code if status.is_server_error() => PmsError::Transient(format!("status {code}")),
        code => PmsError::Rejected(format!("status {code}")),
    })
}

pub(crate) fn transport_error(error: reqwest::Error) -> PmsError {
    PmsError::Transient(error.to_string())
}
