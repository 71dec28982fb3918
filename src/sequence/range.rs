//! Inclusive calendar date ranges and date parsing.

use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerraError};
use crate::layers::tile_url::API_DATE_FORMAT;

/// Inclusive range of calendar days, one frame per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Rejects ranges whose end precedes their start.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(TerraError::invalid_range(format!(
                "end date {end} precedes start date {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse both ends as `YYYY-MM-DD`.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days, both ends included.
    pub fn day_count(&self) -> usize {
        // end >= start is guaranteed by construction
        (self.end - self.start).num_days() as usize + 1
    }

    /// Every day from start to end, in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.day_count() as i64).map(move |offset| start + ChronoDuration::days(offset))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let input = input.trim();
    let bytes = input.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());

    if !well_formed {
        return Err(TerraError::invalid_range(format!(
            "'{input}' is not a YYYY-MM-DD date"
        )));
    }

    NaiveDate::parse_from_str(input, API_DATE_FORMAT)
        .map_err(|e| TerraError::invalid_range(format!("'{input}' is not a valid date: {e}")))
}

/// Initial date from a Worldview-style query string (`?t=2024-09-10T00:00:00Z`).
///
/// Only the date part of `t` is used. Returns `None` when the parameter is
/// absent or malformed.
pub fn date_from_query(query: &str) -> Option<NaiveDate> {
    let query = query.trim_start_matches('?');
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "t")
        .and_then(|(_, value)| value.get(..10))
        .and_then(|day| parse_date(day).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_inclusive_day_count() {
        let range = DateRange::parse("2024-09-09", "2024-09-30").unwrap();
        assert_eq!(range.day_count(), 22);

        let dates: Vec<NaiveDate> = range.dates().collect();
        assert_eq!(dates.len(), 22);
        assert_eq!(dates.first(), Some(&date("2024-09-09")));
        assert_eq!(dates.last(), Some(&date("2024-09-30")));
        assert!(dates.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_single_day_range() {
        let range = DateRange::parse("2024-02-29", "2024-02-29").unwrap();
        assert_eq!(range.dates().collect::<Vec<_>>(), vec![date("2024-02-29")]);
    }

    #[test]
    fn test_range_crosses_month_boundary() {
        let range = DateRange::parse("2024-01-30", "2024-02-02").unwrap();
        assert_eq!(range.day_count(), 4);
        assert!(range.contains(date("2024-02-01")));
        assert!(!range.contains(date("2024-02-03")));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let err = DateRange::parse("2024-09-30", "2024-09-09").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RANGE");
    }

    #[test_case("2024-9-9" ; "unpadded")]
    #[test_case("2024/09/09" ; "slashes")]
    #[test_case("2024-02-30" ; "impossible day")]
    #[test_case("" ; "empty")]
    #[test_case("09-09-2024" ; "day first")]
    fn test_parse_date_rejects(input: &str) {
        assert_eq!(parse_date(input).unwrap_err().error_code(), "INVALID_RANGE");
    }

    #[test_case("?t=2024-09-10T00:00:00Z", Some("2024-09-10") ; "timestamp")]
    #[test_case("v=-180,-90,180,90&t=2024-09-10", Some("2024-09-10") ; "among other params")]
    #[test_case("?z=4", None ; "absent")]
    #[test_case("?t=yesterday", None ; "malformed")]
    #[test_case("?t=2024", None ; "too short")]
    fn test_date_from_query(query: &str, expected: Option<&str>) {
        assert_eq!(date_from_query(query), expected.map(date));
    }
}
