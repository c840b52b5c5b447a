use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::property::{Cents, PropertyId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideSource {
    Manual,
    Ai,
}

impl OverrideSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Ai => "ai",
        }
    }
}

/// Per-date price record keyed on `(property_id, date)`. A locked override is
/// never replaced by the engine; an unlocked one is replaced on the next run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceOverride {
    pub property_id: PropertyId,
    pub date: NaiveDate,
    pub price: Cents,
    pub is_locked: bool,
    pub reason: Option<String>,
    pub source: OverrideSource,
    pub updated_at: DateTime<Utc>,
}

impl PriceOverride {
    pub fn ai(property_id: PropertyId, date: NaiveDate, price: Cents, reason: impl Into<String>) -> Self {
        Self {
            property_id,
            date,
            price,
            is_locked: false,
            reason: Some(reason.into()),
            source: OverrideSource::Ai,
            updated_at: Utc::now(),
        }
    }
}
