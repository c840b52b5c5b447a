//! TEXT-column codecs. Dates are `%Y-%m-%d`, timestamps RFC 3339 in UTC,
//! which keeps lexical and chronological order identical inside SQLite.

use chrono::{DateTime, NaiveDate, Utc};

use super::RepositoryError;

pub(crate) fn parse_date(field: &str, value: &str) -> Result<NaiveDate, RepositoryError> {
    value
        .parse::<NaiveDate>()
        .map_err(|error| RepositoryError::Decode(format!("invalid date in {field}: {error}")))
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp in {field}: {error}")))
}

pub(crate) fn fmt_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339()
}
