use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Monetary amount in the property's minor currency unit (cents).
pub type Cents = i64;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub String);

/// Host-chosen risk posture. Widens or narrows the allowed deviation of
/// the AI recommendation from the base price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Prudent,
    Balanced,
    Aggressive,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prudent => "prudent",
            Self::Balanced => "balanced",
            Self::Aggressive => "aggressive",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "prudent" => Ok(Self::Prudent),
            "balanced" => Ok(Self::Balanced),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown pricing strategy `{other}`"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub tenant_id: TenantId,
    pub pms_integration_id: Option<String>,
    pub pms_id: Option<String>,
    pub name: String,
    pub city: String,
    pub property_type: String,
    pub currency: String,
    /// Local UTC offset in minutes. IANA resolution happens at import time;
    /// the engine only needs a stable local-day boundary.
    pub tz_offset_minutes: i32,
    pub base_price: Cents,
    pub floor_price: Cents,
    pub ceiling_price: Option<Cents>,
    pub strategy: Strategy,
    pub pricing_enabled: bool,
    pub pms_sync_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.base_price <= 0 {
            return Err(DomainError::InvariantViolation(format!(
                "property {}: base_price must be positive",
                self.id.0
            )));
        }
        if self.floor_price < 0 {
            return Err(DomainError::InvariantViolation(format!(
                "property {}: floor_price must not be negative",
                self.id.0
            )));
        }
        if let Some(ceiling) = self.ceiling_price {
            if ceiling < self.floor_price {
                return Err(DomainError::InvariantViolation(format!(
                    "property {}: ceiling_price {} below floor_price {}",
                    self.id.0, ceiling, self.floor_price
                )));
            }
        }
        Ok(())
    }

    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.tz_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Property, PropertyId, Strategy, TenantId};

    fn property() -> Property {
        Property {
            id: PropertyId("P-1".to_string()),
            tenant_id: TenantId("T-1".to_string()),
            pms_integration_id: None,
            pms_id: None,
            name: "Loft".to_string(),
            city: "Lisbon".to_string(),
            property_type: "apartment".to_string(),
            currency: "EUR".to_string(),
            tz_offset_minutes: 60,
            base_price: 10_000,
            floor_price: 8_000,
            ceiling_price: Some(20_000),
            strategy: Strategy::Balanced,
            pricing_enabled: true,
            pms_sync_enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn valid_property_passes_validation() {
        property().validate().expect("valid property");
    }

    #[test]
    fn ceiling_below_floor_is_rejected() {
        let mut p = property();
        p.ceiling_price = Some(5_000);
        assert!(p.validate().is_err());
    }

    #[test]
    fn non_positive_base_price_is_rejected() {
        let mut p = property();
        p.base_price = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn strategy_round_trips_through_strings() {
        for strategy in [Strategy::Prudent, Strategy::Balanced, Strategy::Aggressive] {
            assert_eq!(Strategy::parse(strategy.as_str()).expect("parse"), strategy);
        }
        assert!(Strategy::parse("yolo").is_err());
    }
}
