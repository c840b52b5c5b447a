use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Per-(property, date) feature vector fed to the model runner. All scores
/// are normalized to roughly 0..=1 by the assembler; the regressors expect a
/// leading bias term.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Monday = 0 .. Sunday = 6.
    pub day_of_week: u32,
    pub lead_time_days: i64,
    pub local_event_impact: f64,
    pub weather_score: f64,
    pub local_market_demand_score: f64,
    pub historical_occupancy_lagged: f64,
}

impl FeatureVector {
    pub fn new(today: NaiveDate, target: NaiveDate) -> Self {
        Self {
            day_of_week: target.weekday().num_days_from_monday(),
            lead_time_days: (target - today).num_days(),
            local_event_impact: 0.0,
            weather_score: 0.5,
            local_market_demand_score: 0.5,
            historical_occupancy_lagged: 0.0,
        }
    }

    pub fn with_event_impact(mut self, impact: f64) -> Self {
        self.local_event_impact = impact.clamp(0.0, 1.0);
        self
    }

    pub fn with_weather_score(mut self, score: f64) -> Self {
        self.weather_score = score.clamp(0.0, 1.0);
        self
    }

    pub fn with_market_demand(mut self, score: f64) -> Self {
        self.local_market_demand_score = score.clamp(0.0, 1.0);
        self
    }

    pub fn with_occupancy_lag(mut self, occupancy: f64) -> Self {
        self.historical_occupancy_lagged = occupancy.clamp(0.0, 1.0);
        self
    }

    /// Normalized input vector for the serialized regressors.
    ///
    /// - day_of_week: x / 6
    /// - lead_time_days: ln(1 + x) / 6 (~one year of lead -> ~1.0)
    /// - remaining scores pass through already normalized
    pub fn to_normalized_vector(&self) -> Vec<f64> {
        let lead = self.lead_time_days.max(0) as f64;
        vec![
            1.0, // bias term
            (self.day_of_week as f64 / 6.0).clamp(0.0, 1.0),
            ((1.0 + lead).ln() / 6.0).clamp(0.0, 1.0),
            self.local_event_impact.clamp(0.0, 1.0),
            self.weather_score.clamp(0.0, 1.0),
            self.local_market_demand_score.clamp(0.0, 1.0),
            self.historical_occupancy_lagged.clamp(0.0, 1.0),
        ]
    }
}
