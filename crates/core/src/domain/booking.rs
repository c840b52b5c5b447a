use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::property::{Cents, PropertyId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

/// A stay over `[start_date, end_date_exclusive)`. The checkout day is never
/// part of the interval; adapters normalize inclusive-last-night feeds before
/// a booking reaches this type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub property_id: PropertyId,
    pub start_date: NaiveDate,
    pub end_date_exclusive: NaiveDate,
    pub price_per_night: Cents,
    pub channel: String,
    pub booked_at: DateTime<Utc>,
}

impl Booking {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.end_date_exclusive <= self.start_date {
            return Err(DomainError::InvariantViolation(format!(
                "booking {}: end date {} is not after start date {}",
                self.id.0, self.end_date_exclusive, self.start_date
            )));
        }
        if self.price_per_night < 0 {
            return Err(DomainError::InvariantViolation(format!(
                "booking {}: negative nightly price",
                self.id.0
            )));
        }
        Ok(())
    }

    pub fn nights(&self) -> i64 {
        (self.end_date_exclusive - self.start_date).num_days()
    }

    /// Half-open interval overlap. Bookings of the same property must never
    /// share a night.
    pub fn overlaps(&self, other: &Booking) -> bool {
        self.property_id == other.property_id
            && self.start_date < other.end_date_exclusive
            && other.start_date < self.end_date_exclusive
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use crate::domain::property::PropertyId;

    use super::{Booking, BookingId};

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid test date")
    }

    fn booking(id: &str, property: &str, start: &str, end: &str) -> Booking {
        Booking {
            id: BookingId(id.to_string()),
            property_id: PropertyId(property.to_string()),
            start_date: date(start),
            end_date_exclusive: date(end),
            price_per_night: 12_000,
            channel: "airbnb".to_string(),
            booked_at: Utc::now(),
        }
    }

    #[test]
    fn back_to_back_stays_do_not_overlap() {
        let first = booking("B-1", "P-1", "2025-06-01", "2025-06-04");
        let second = booking("B-2", "P-1", "2025-06-04", "2025-06-07");
        assert!(!first.overlaps(&second));
        assert!(!second.overlaps(&first));
    }

    #[test]
    fn shared_night_is_an_overlap() {
        let first = booking("B-1", "P-1", "2025-06-01", "2025-06-05");
        let second = booking("B-2", "P-1", "2025-06-04", "2025-06-08");
        assert!(first.overlaps(&second));
    }

    #[test]
    fn different_properties_never_overlap() {
        let first = booking("B-1", "P-1", "2025-06-01", "2025-06-05");
        let second = booking("B-2", "P-2", "2025-06-01", "2025-06-05");
        assert!(!first.overlaps(&second));
    }

    #[test]
    fn zero_night_booking_is_rejected() {
        let b = booking("B-1", "P-1", "2025-06-01", "2025-06-01");
        assert!(b.validate().is_err());
    }

    #[test]
    fn nights_counts_the_half_open_interval() {
        let b = booking("B-1", "P-1", "2025-06-01", "2025-06-04");
        assert_eq!(b.nights(), 3);
    }
}
