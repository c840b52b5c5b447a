use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::property::{Cents, PropertyId};

/// Persisted output of one ensemble pass for one (property, date) cell.
/// Individual model prices are kept for transparency even when a locked
/// override means the recommendation is not applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingRecommendation {
    pub property_id: PropertyId,
    pub date: NaiveDate,
    pub price_prophet: Option<Cents>,
    pub price_xgboost: Option<Cents>,
    pub price_nn: Option<Cents>,
    pub price_gpt: Option<Cents>,
    pub price_recommended: Cents,
    /// 0..=100.
    pub confidence_score: f64,
    pub explanation: String,
    pub key_factors: Vec<String>,
    /// Model name -> artifact version, e.g. `{"xgboost": "2024-11-03"}`.
    pub model_versions: BTreeMap<String, String>,
    pub generated_at: DateTime<Utc>,
}
