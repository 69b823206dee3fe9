/// Location, DateRange, DailyRecord, HourlyRecord, CoverageDecision
/// and the error types shared across the service.
///
/// Core data types for the temperature forecasting service.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no I/O, only types and the small amount of date arithmetic
/// that belongs to them.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Calendar date format used by the weather API and the document store.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// A tracked geographic point. Static for the duration of a run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

// ---------------------------------------------------------------------------
// Date ranges
// ---------------------------------------------------------------------------

/// An inclusive range of calendar dates. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Builds a range, returning `None` if `end` precedes `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        if end < start {
            None
        } else {
            Some(Self { start, end })
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// `end - start` in days. A single-day range has a span of 0.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Number of calendar dates covered, inclusive of both ends.
    pub fn num_days(&self) -> usize {
        self.span_days() as usize + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date in the range, in ascending order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..=self.span_days()).map(move |offset| self.start + Duration::days(offset))
    }

    /// Returns a copy with the end moved back to `end` if it lies beyond it.
    pub fn clamp_end(&self, end: NaiveDate) -> Option<Self> {
        Self::new(self.start, self.end.min(end))
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start_str(), self.end_str())
    }
}

// ---------------------------------------------------------------------------
// Weather attributes
// ---------------------------------------------------------------------------

/// Weather attributes shared by daily and hourly observations.
///
/// The fields the forecasting models know about are listed explicitly.
/// Anything else the API returns is kept verbatim in `extra` so that it
/// survives the round trip into the document store.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WeatherAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempmax: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempmin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feelslike: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feelslikemax: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feelslikemin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dew: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precip: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windspeed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winddir: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudcover: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solarradiation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uvindex: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<String>,
    /// Fields not modelled above, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WeatherAttributes {
    /// All numeric attributes by name: the explicit fields that are present,
    /// followed by any numeric pass-through fields, sorted by name.
    pub fn numeric_fields(&self) -> Vec<(String, f64)> {
        let explicit = [
            ("temp", self.temp),
            ("tempmax", self.tempmax),
            ("tempmin", self.tempmin),
            ("feelslike", self.feelslike),
            ("feelslikemax", self.feelslikemax),
            ("feelslikemin", self.feelslikemin),
            ("humidity", self.humidity),
            ("dew", self.dew),
            ("precip", self.precip),
            ("windspeed", self.windspeed),
            ("winddir", self.winddir),
            ("pressure", self.pressure),
            ("cloudcover", self.cloudcover),
            ("visibility", self.visibility),
            ("solarradiation", self.solarradiation),
            ("uvindex", self.uvindex),
        ];

        let mut fields: Vec<(String, f64)> = explicit
            .iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .collect();

        let mut extras: Vec<(String, f64)> = self
            .extra
            .iter()
            .filter_map(|(name, value)| value.as_f64().map(|v| (name.clone(), v)))
            .collect();
        extras.sort_by(|a, b| a.0.cmp(&b.0));
        fields.extend(extras);
        fields
    }
}

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// One day of observations for a location. Unique per (city, datetime).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DailyRecord {
    pub city: String,
    /// Calendar date, "YYYY-MM-DD".
    pub datetime: String,
    #[serde(flatten)]
    pub attributes: WeatherAttributes,
}

impl DailyRecord {
    pub fn date(&self) -> Result<NaiveDate, MalformedRecordError> {
        NaiveDate::parse_from_str(&self.datetime, DATE_FORMAT).map_err(|_| MalformedRecordError {
            city: self.city.clone(),
            value: self.datetime.clone(),
        })
    }
}

/// One hour of observations. Unique per (city, date, datetime).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HourlyRecord {
    pub city: String,
    /// Calendar date of the parent day, "YYYY-MM-DD".
    pub date: String,
    /// Hour timestamp as reported by the API, e.g. "13:00:00".
    pub datetime: String,
    #[serde(flatten)]
    pub attributes: WeatherAttributes,
}

// ---------------------------------------------------------------------------
// Coverage
// ---------------------------------------------------------------------------

/// What the reconciler concluded about a location's stored coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageDecision {
    /// Every requested date is stored; nothing to fetch.
    Complete,
    /// Stored data starts after the requested start; fetch the head only.
    PartialHead,
    /// Stored data ends before the requested end; fetch the tail only.
    PartialTail,
    /// Nothing stored; fetch the whole requested range.
    Empty,
    /// Some data is stored but the gap can't be expressed as a single
    /// missing edge; fetch the whole requested range.
    Incomplete,
}

impl std::fmt::Display for CoverageDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoverageDecision::Complete => write!(f, "complete"),
            CoverageDecision::PartialHead => write!(f, "partial-head"),
            CoverageDecision::PartialTail => write!(f, "partial-tail"),
            CoverageDecision::Empty => write!(f, "empty"),
            CoverageDecision::Incomplete => write!(f, "incomplete"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A requested date range that can't be used. Always fatal for a run.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidDateError {
    /// The input is not a `YYYY-MM-DD` calendar date.
    Unparseable(String),
    /// The end date precedes the start date.
    Inverted { start: String, end: String },
    /// The start date lies after today.
    StartInFuture { start: String, today: String },
}

impl std::fmt::Display for InvalidDateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidDateError::Unparseable(value) => {
                write!(f, "Invalid date '{}': expected YYYY-MM-DD", value)
            }
            InvalidDateError::Inverted { start, end } => {
                write!(f, "Invalid date range: end {} is before start {}", end, start)
            }
            InvalidDateError::StartInFuture { start, today } => {
                write!(f, "Invalid date range: start {} is after today ({})", start, today)
            }
        }
    }
}

impl std::error::Error for InvalidDateError {}

/// Errors that can arise when fetching from the weather API.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Non-2xx HTTP response.
    Http(u16),
    /// The response body could not be deserialized.
    Parse(String),
    /// The request never produced a response (DNS, TLS, timeout...).
    Transport(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Http(code) => write!(f, "HTTP error: {}", code),
            FetchError::Parse(msg) => write!(f, "Parse error: {}", msg),
            FetchError::Transport(msg) => write!(f, "Transport error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// A persisted record without a usable calendar date.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRecordError {
    pub city: String,
    pub value: String,
}

impl std::fmt::Display for MalformedRecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Malformed record for {}: unusable date '{}'", self.city, self.value)
    }
}

impl std::error::Error for MalformedRecordError {}

/// Errors raised by the document store.
#[derive(Debug)]
pub enum StoreError {
    Database(postgres::Error),
    Serialization(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<postgres::Error> for StoreError {
    fn from(e: postgres::Error) -> Self {
        StoreError::Database(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_date_range_rejects_inverted_bounds() {
        assert!(DateRange::new(date("2024-04-18"), date("2024-04-11")).is_none());
        assert!(DateRange::new(date("2024-04-11"), date("2024-04-11")).is_some());
    }

    #[test]
    fn test_date_range_span_and_count() {
        let range = DateRange::new(date("2024-04-11"), date("2024-04-18")).unwrap();
        assert_eq!(range.span_days(), 7);
        assert_eq!(range.num_days(), 8);
        assert_eq!(range.dates().count(), 8);
        assert_eq!(range.dates().last(), Some(date("2024-04-18")));
        assert_eq!(range.to_string(), "2024-04-11..2024-04-18");
    }

    #[test]
    fn test_daily_record_keeps_unknown_fields() {
        let json = r#"{
            "city": "Paris",
            "datetime": "2024-04-11",
            "temp": 55.2,
            "humidity": 71.0,
            "sunrise": "06:58:41",
            "snowdepth": 0.0
        }"#;
        let record: DailyRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.attributes.temp, Some(55.2));
        assert_eq!(record.attributes.extra["sunrise"], "06:58:41");

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["snowdepth"], 0.0);
        assert_eq!(back["city"], "Paris");
    }

    #[test]
    fn test_numeric_fields_include_numeric_extras_only() {
        let mut attrs = WeatherAttributes {
            temp: Some(50.0),
            humidity: Some(80.0),
            conditions: Some("Rain".into()),
            ..Default::default()
        };
        attrs.extra.insert("snow".into(), Value::from(1.5));
        attrs.extra.insert("icon".into(), Value::from("rain"));

        let names: Vec<String> = attrs.numeric_fields().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["temp", "humidity", "snow"]);
    }

    #[test]
    fn test_malformed_date_is_reported() {
        let record = DailyRecord {
            city: "Paris".into(),
            datetime: "11/04/2024".into(),
            attributes: WeatherAttributes::default(),
        };
        let err = record.date().unwrap_err();
        assert_eq!(err.value, "11/04/2024");
        assert!(err.to_string().contains("Paris"));
    }
}
