//! Date range parsing for report queries.
//!
//! Calendar days are always UTC days. A validated range runs from the first
//! millisecond of the start day to the last millisecond of the end day, so
//! callers can filter with a plain inclusive comparison.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::error::StatsError;

pub const START_FIELD: &str = "start date";
pub const END_FIELD: &str = "end date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end.date_naive() - self.start.date_naive()).num_days() + 1
    }
}

pub fn prepare_date_range(
    start_text: Option<&str>,
    end_text: Option<&str>,
) -> Result<DateRange, StatsError> {
    let start = parse_day(start_text, START_FIELD)?;
    let end = parse_day(end_text, END_FIELD)?;

    if start > end {
        return Err(StatsError::InvalidRange { start, end });
    }

    Ok(DateRange {
        start: start_of_day(start),
        end: end_of_day(end),
    })
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp; the latter is reduced to
/// its UTC calendar day.
pub fn parse_day(text: Option<&str>, field: &'static str) -> Result<NaiveDate, StatsError> {
    let text = text
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(StatsError::InvalidDate { field })?;

    if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(day);
    }

    DateTime::parse_from_rfc3339(text)
        .map(|instant| instant.with_timezone(&Utc).date_naive())
        .map_err(|_| StatsError::InvalidDate { field })
}

/// Parses a check-in timestamp. A bare date means the start of that UTC day.
pub fn parse_instant(text: &str, field: &'static str) -> Result<DateTime<Utc>, StatsError> {
    let text = text.trim();
    match DateTime::parse_from_rfc3339(text) {
        Ok(instant) => Ok(instant.with_timezone(&Utc)),
        Err(_) => parse_day(Some(text), field).map(start_of_day),
    }
}

pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

pub fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    start_of_day(day) + Duration::days(1) - Duration::milliseconds(1)
}
