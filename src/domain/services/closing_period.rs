//! Closing Period Detection
//!
//! Source systems publish a month's final figures during the first days of
//! the following month. Given the date a report was collected and the month
//! it says it describes, this module decides which month the data belongs to
//! and which date the snapshot should be filed under.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::errors::ValidationError;
use crate::domain::value_objects::year_month::YearMonth;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosingPeriodResult {
    pub is_closing_period: bool,
    pub data_month: YearMonth,
    /// Always the original collection date, never the snapshot date.
    pub as_of_date: NaiveDate,
    pub collection_date: NaiveDate,
    /// Last day of the data month for closing periods, else the collection date.
    pub snapshot_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClosingPeriodDetector;

impl ClosingPeriodDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify a report collected on `collection_date` for `data_month`.
    ///
    /// `data_month` is `YYYY-MM` or a bare month number (`"12"`); a bare month
    /// later than the collection month belongs to the previous year.
    pub fn detect(
        &self,
        collection_date: NaiveDate,
        data_month: &str,
    ) -> Result<ClosingPeriodResult, ValidationError> {
        let collection_month = YearMonth::from_date(collection_date);
        let data_month = parse_data_month(data_month, collection_date)?;

        if data_month > collection_month {
            return Err(ValidationError::DataMonthAfterCollection {
                data_month: data_month.to_string(),
                collection_month: collection_month.to_string(),
            });
        }

        let is_closing_period = data_month < collection_month;
        let snapshot_date = if is_closing_period {
            data_month.last_day()
        } else {
            collection_date
        };

        debug!(
            collection_date = %collection_date,
            data_month = %data_month,
            is_closing_period,
            snapshot_date = %snapshot_date,
            "Closing period detection"
        );

        Ok(ClosingPeriodResult {
            is_closing_period,
            data_month,
            as_of_date: collection_date,
            collection_date,
            snapshot_date,
        })
    }

    /// Same as [`detect`](Self::detect) with the collection date as text
    /// (`YYYY-MM-DD` or an RFC 3339 timestamp).
    pub fn detect_str(
        &self,
        collection_date: &str,
        data_month: &str,
    ) -> Result<ClosingPeriodResult, ValidationError> {
        self.detect(parse_collection_date(collection_date)?, data_month)
    }
}

pub fn parse_collection_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .map_err(|_| ValidationError::InvalidDate(format!("'{}' is not a valid date", raw)))
}

fn parse_data_month(raw: &str, collection_date: NaiveDate) -> Result<YearMonth, ValidationError> {
    let raw = raw.trim();
    if raw.contains('-') {
        return raw.parse();
    }

    if raw.is_empty() || raw.len() > 2 || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidMonth(format!(
            "'{}' is neither YYYY-MM nor a month number",
            raw
        )));
    }
    let month: u32 = raw
        .parse()
        .map_err(|_| ValidationError::InvalidMonth(raw.to_string()))?;

    let collection = YearMonth::from_date(collection_date);
    let year = if month > collection.month() {
        collection.year() - 1
    } else {
        collection.year()
    };
    YearMonth::new(year, month)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_same_month_is_not_closing_period() {
        let detector = ClosingPeriodDetector::new();
        let result = detector.detect(date(2026, 1, 20), "2026-01").unwrap();
        assert!(!result.is_closing_period);
        assert_eq!(result.snapshot_date, date(2026, 1, 20));
        assert_eq!(result.collection_date, date(2026, 1, 20));
        assert_eq!(result.as_of_date, date(2026, 1, 20));
    }

    #[test]
    fn test_december_reported_in_january() {
        let detector = ClosingPeriodDetector::new();
        let result = detector.detect(date(2026, 1, 6), "2025-12").unwrap();
        assert!(result.is_closing_period);
        assert_eq!(result.data_month.to_string(), "2025-12");
        assert_eq!(result.snapshot_date, date(2025, 12, 31));
        assert_eq!(result.collection_date, date(2026, 1, 6));
        assert_eq!(result.as_of_date, date(2026, 1, 6));
    }

    #[test]
    fn test_bare_month_infers_previous_year() {
        let detector = ClosingPeriodDetector::new();
        let result = detector.detect(date(2026, 1, 3), "12").unwrap();
        assert!(result.is_closing_period);
        assert_eq!(result.data_month.to_string(), "2025-12");
        assert_eq!(result.snapshot_date, date(2025, 12, 31));
    }

    #[test]
    fn test_bare_month_same_year() {
        let detector = ClosingPeriodDetector::new();
        let result = detector.detect(date(2026, 3, 2), "02").unwrap();
        assert!(result.is_closing_period);
        assert_eq!(result.data_month.to_string(), "2026-02");
        assert_eq!(result.snapshot_date, date(2026, 2, 28));

        let same = detector.detect(date(2026, 3, 2), "3").unwrap();
        assert!(!same.is_closing_period);
    }

    #[test]
    fn test_leap_february_closing() {
        let detector = ClosingPeriodDetector::new();
        let result = detector.detect(date(2024, 3, 1), "2024-02").unwrap();
        assert_eq!(result.snapshot_date, date(2024, 2, 29));
    }

    #[test]
    fn test_thirty_day_month_closing() {
        let detector = ClosingPeriodDetector::new();
        let result = detector.detect(date(2025, 5, 4), "2025-04").unwrap();
        assert_eq!(result.snapshot_date, date(2025, 4, 30));
    }

    #[test]
    fn test_data_month_after_collection_is_error() {
        let detector = ClosingPeriodDetector::new();
        let err = detector.detect(date(2026, 1, 6), "2026-02").unwrap_err();
        assert!(matches!(err, ValidationError::DataMonthAfterCollection { .. }));
    }

    #[test]
    fn test_malformed_input() {
        let detector = ClosingPeriodDetector::new();
        assert!(detector.detect(date(2026, 1, 6), "13").is_err());
        assert!(detector.detect(date(2026, 1, 6), "0").is_err());
        assert!(detector.detect(date(2026, 1, 6), "dec").is_err());
        assert!(detector.detect(date(2026, 1, 6), "").is_err());
        assert!(detector.detect_str("2026-13-01", "2025-12").is_err());
        assert!(detector.detect_str("yesterday", "2025-12").is_err());
    }

    #[test]
    fn test_detect_str_accepts_timestamps() {
        let detector = ClosingPeriodDetector::new();
        let result = detector.detect_str("2026-01-06T08:30:00Z", "2025-12").unwrap();
        assert_eq!(result.collection_date, date(2026, 1, 6));
        assert_eq!(result.snapshot_date, date(2025, 12, 31));
    }
}
