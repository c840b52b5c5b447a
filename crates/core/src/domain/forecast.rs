use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Market-level demand signal keyed on (city, property type, date). Shared
/// across tenants; refreshed by an external job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandForecast {
    pub city: String,
    pub property_type: String,
    pub forecast_date: NaiveDate,
    /// 0..=100.
    pub demand_score: f64,
}

impl DemandForecast {
    /// Score normalized to 0..=1 for the ensemble tiers.
    pub fn normalized_score(&self) -> f64 {
        (self.demand_score / 100.0).clamp(0.0, 1.0)
    }
}
