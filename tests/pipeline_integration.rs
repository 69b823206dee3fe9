/// Integration tests for a full batch run
///
/// Tests verify:
/// 1. Coverage reconciliation narrows each location's fetch range
/// 2. With full refresh off every location fetches the whole range and the
///    writer still deduplicates
/// 3. A fetch failure stops the run's fetching and forecasting at that
///    location without losing what was already written
///
/// Runs entirely in-process: `MemoryStore` plus a scripted weather source.

use chrono::NaiveDate;
use std::cell::RefCell;

use tempcast_service::dates::validate;
use tempcast_service::ingest::weather_api::{DayPayload, HourPayload, WeatherSource};
use tempcast_service::model::{CoverageDecision, DailyRecord, DateRange, FetchError, Location, WeatherAttributes};
use tempcast_service::pipeline::{self, ForecastOutcome, PipelineOptions};
use tempcast_service::store::{MemoryStore, WeatherStore};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Answers every request with generated days, except for one location
/// that gets an HTTP error. Remembers what it was asked for.
struct ScriptedSource {
    fail_for: Option<String>,
    calls: RefCell<Vec<(String, DateRange)>>,
}

impl ScriptedSource {
    fn new() -> Self {
        Self {
            fail_for: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn failing_for(name: &str) -> Self {
        Self {
            fail_for: Some(name.to_string()),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn called(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(name, _)| name.clone()).collect()
    }
}

fn temp_for(date: NaiveDate) -> f64 {
    use chrono::Datelike;
    50.0 + (date.ordinal() % 5) as f64 + 0.3 * (date.ordinal() % 3) as f64
}

impl WeatherSource for ScriptedSource {
    fn fetch_days(&self, location: &Location, range: &DateRange) -> Result<Vec<DayPayload>, FetchError> {
        self.calls.borrow_mut().push((location.name.clone(), *range));

        if self.fail_for.as_deref() == Some(location.name.as_str()) {
            return Err(FetchError::Http(429));
        }

        Ok(range
            .dates()
            .map(|date| DayPayload {
                datetime: date.format("%Y-%m-%d").to_string(),
                hours: Some(
                    ["00:00:00", "12:00:00"]
                        .iter()
                        .map(|h| HourPayload {
                            datetime: h.to_string(),
                            attributes: WeatherAttributes {
                                temp: Some(temp_for(date) - 2.0),
                                ..Default::default()
                            },
                        })
                        .collect(),
                ),
                attributes: WeatherAttributes {
                    temp: Some(temp_for(date)),
                    humidity: Some(70.0),
                    ..Default::default()
                },
            })
            .collect())
    }
}

fn location(name: &str, latitude: f64, longitude: f64) -> Location {
    Location {
        name: name.to_string(),
        latitude,
        longitude,
    }
}

fn five_locations() -> Vec<Location> {
    vec![
        location("Paris", 48.8566, 2.3522),
        location("Warsaw", 52.2297, 21.0122),
        location("Lisbon", 38.7223, -9.1393),
        location("Oslo", 59.9139, 10.7522),
        location("Rome", 41.9028, 12.4964),
    ]
}

fn seed_days(store: &mut MemoryStore, city: &str, range: DateRange) {
    for date in range.dates() {
        store
            .insert_day_if_absent(&DailyRecord {
                city: city.to_string(),
                datetime: date.format("%Y-%m-%d").to_string(),
                attributes: WeatherAttributes {
                    temp: Some(temp_for(date)),
                    ..Default::default()
                },
            })
            .unwrap();
    }
}

fn options(full_refresh: bool) -> PipelineOptions {
    PipelineOptions {
        date_start: "2024-04-11".to_string(),
        date_end: "2024-04-18".to_string(),
        full_refresh,
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

// ---------------------------------------------------------------------------
// Coverage reconciliation
// ---------------------------------------------------------------------------

#[test]
fn test_partial_tail_fetches_only_missing_days() {
    let mut store = MemoryStore::new();
    seed_days(&mut store, "Paris", validate("2024-04-11", "2024-04-15").unwrap());
    let source = ScriptedSource::new();
    let locations = vec![location("Paris", 48.8566, 2.3522)];

    let summary = pipeline::run(&options(true), &locations, &mut store, &source, today()).unwrap();

    let paris = summary.outcome("Paris").unwrap();
    assert_eq!(paris.decision, Some(CoverageDecision::PartialTail));
    assert_eq!(paris.fetched, Some(validate("2024-04-16", "2024-04-18").unwrap()));
    assert_eq!(paris.ingest.unwrap().days_inserted, 3);
    assert_eq!(store.day_count("Paris").unwrap(), 8);
    assert_eq!(store.hour_count("Paris"), 6);

    // forecast covers the whole requested range, not just the fetched tail
    match &paris.forecast {
        ForecastOutcome::Reported(report) => assert!(report.predicted_fahrenheit.is_finite()),
        other => panic!("expected a forecast, got {:?}", other),
    }
}

#[test]
fn test_partial_head_fetches_leading_days() {
    let mut store = MemoryStore::new();
    seed_days(&mut store, "Paris", validate("2024-04-14", "2024-04-18").unwrap());
    let source = ScriptedSource::new();
    let locations = vec![location("Paris", 48.8566, 2.3522)];

    let summary = pipeline::run(&options(true), &locations, &mut store, &source, today()).unwrap();

    let paris = summary.outcome("Paris").unwrap();
    assert_eq!(paris.decision, Some(CoverageDecision::PartialHead));
    assert_eq!(paris.fetched, Some(validate("2024-04-11", "2024-04-13").unwrap()));
    assert_eq!(store.day_count("Paris").unwrap(), 8);
}

#[test]
fn test_complete_location_is_not_fetched_but_still_forecast() {
    let mut store = MemoryStore::new();
    let requested = validate("2024-04-11", "2024-04-18").unwrap();
    seed_days(&mut store, "Paris", requested);
    let source = ScriptedSource::new();
    let locations = vec![location("Paris", 48.8566, 2.3522), location("Warsaw", 52.2297, 21.0122)];

    let summary = pipeline::run(&options(true), &locations, &mut store, &source, today()).unwrap();

    assert_eq!(source.called(), vec!["Warsaw".to_string()]);
    let paris = summary.outcome("Paris").unwrap();
    assert_eq!(paris.decision, Some(CoverageDecision::Complete));
    assert_eq!(paris.fetched, None);
    assert!(matches!(paris.forecast, ForecastOutcome::Reported(_)));

    let warsaw = summary.outcome("Warsaw").unwrap();
    assert_eq!(warsaw.decision, Some(CoverageDecision::Empty));
    assert_eq!(warsaw.fetched, Some(requested));
    assert_eq!(summary.forecasts_reported(), 2);
}

#[test]
fn test_malformed_stored_date_triggers_full_fetch() {
    let mut store = MemoryStore::new();
    for datetime in ["2024-04-11", "2024-04-12", "2024-04-13Z"] {
        store
            .insert_day_if_absent(&DailyRecord {
                city: "Paris".to_string(),
                datetime: datetime.to_string(),
                attributes: WeatherAttributes::default(),
            })
            .unwrap();
    }
    let source = ScriptedSource::new();
    let locations = vec![location("Paris", 48.8566, 2.3522)];

    let summary = pipeline::run(&options(true), &locations, &mut store, &source, today()).unwrap();

    let requested = validate("2024-04-11", "2024-04-18").unwrap();
    let paris = summary.outcome("Paris").unwrap();
    assert_eq!(paris.decision, Some(CoverageDecision::Empty));
    assert_eq!(paris.fetched, Some(requested));
    assert_eq!(source.calls.borrow()[0], ("Paris".to_string(), requested));
    // 11 and 12 already exist; the six valid missing days are written
    assert_eq!(paris.ingest.unwrap().days_inserted, 6);
}

#[test]
fn test_narrowing_is_per_location() {
    let mut store = MemoryStore::new();
    seed_days(&mut store, "Paris", validate("2024-04-11", "2024-04-15").unwrap());
    let source = ScriptedSource::new();
    let locations = vec![location("Paris", 48.8566, 2.3522), location("Warsaw", 52.2297, 21.0122)];

    pipeline::run(&options(true), &locations, &mut store, &source, today()).unwrap();

    let calls = source.calls.borrow();
    assert_eq!(calls[0], ("Paris".to_string(), validate("2024-04-16", "2024-04-18").unwrap()));
    // Paris's narrowing must not leak into the next location
    assert_eq!(calls[1], ("Warsaw".to_string(), validate("2024-04-11", "2024-04-18").unwrap()));
}

// ---------------------------------------------------------------------------
// Full refresh off
// ---------------------------------------------------------------------------

#[test]
fn test_without_full_refresh_everything_is_fetched_and_deduplicated() {
    let mut store = MemoryStore::new();
    let requested = validate("2024-04-11", "2024-04-18").unwrap();
    seed_days(&mut store, "Paris", validate("2024-04-11", "2024-04-15").unwrap());
    let source = ScriptedSource::new();
    let locations = vec![location("Paris", 48.8566, 2.3522)];

    let summary = pipeline::run(&options(false), &locations, &mut store, &source, today()).unwrap();

    let paris = summary.outcome("Paris").unwrap();
    assert_eq!(paris.decision, None);
    assert_eq!(paris.fetched, Some(requested));
    let ingest = paris.ingest.unwrap();
    assert_eq!(ingest.days_inserted, 3);
    assert_eq!(ingest.days_skipped, 5);
    assert_eq!(store.day_count("Paris").unwrap(), 8);
}

#[test]
fn test_rerun_inserts_nothing() {
    let mut store = MemoryStore::new();
    let source = ScriptedSource::new();
    let locations = vec![location("Paris", 48.8566, 2.3522)];

    pipeline::run(&options(false), &locations, &mut store, &source, today()).unwrap();
    let second = pipeline::run(&options(false), &locations, &mut store, &source, today()).unwrap();

    let ingest = second.outcome("Paris").unwrap().ingest.unwrap();
    assert_eq!(ingest.days_inserted, 0);
    assert_eq!(ingest.hours_inserted, 0);
    assert_eq!(ingest.days_skipped, 8);
    assert_eq!(ingest.hours_skipped, 16);
    assert_eq!(store.day_count("Paris").unwrap(), 8);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn test_fetch_failure_truncates_remaining_locations() {
    let mut store = MemoryStore::new();
    let source = ScriptedSource::failing_for("Lisbon");
    let locations = five_locations();

    let summary = pipeline::run(&options(true), &locations, &mut store, &source, today()).unwrap();

    assert_eq!(source.called(), vec!["Paris", "Warsaw", "Lisbon"]);
    let failure = summary.fetch_failure.as_ref().unwrap();
    assert_eq!(failure.location, "Lisbon");
    assert_eq!(failure.error, FetchError::Http(429));

    // earlier locations keep their data and are forecast
    assert_eq!(store.day_count("Paris").unwrap(), 8);
    assert_eq!(store.day_count("Warsaw").unwrap(), 8);
    assert!(matches!(summary.outcome("Paris").unwrap().forecast, ForecastOutcome::Reported(_)));
    assert!(matches!(summary.outcome("Warsaw").unwrap().forecast, ForecastOutcome::Reported(_)));

    // the failing one and everything after are neither fetched nor forecast
    for name in ["Lisbon", "Oslo", "Rome"] {
        assert_eq!(store.day_count(name).unwrap(), 0);
        let outcome = summary.outcome(name).unwrap();
        assert_eq!(outcome.fetched, None);
        assert_eq!(outcome.forecast, ForecastOutcome::Skipped);
    }
}

#[test]
fn test_complete_location_after_failure_is_not_forecast() {
    let mut store = MemoryStore::new();
    seed_days(&mut store, "Oslo", validate("2024-04-11", "2024-04-18").unwrap());
    let source = ScriptedSource::failing_for("Warsaw");
    let locations = five_locations();

    let summary = pipeline::run(&options(true), &locations, &mut store, &source, today()).unwrap();

    assert_eq!(summary.outcome("Oslo").unwrap().decision, Some(CoverageDecision::Complete));
    assert_eq!(summary.outcome("Oslo").unwrap().forecast, ForecastOutcome::Skipped);
    assert_eq!(summary.forecasts_reported(), 1);
}

#[test]
fn test_invalid_dates_fail_before_any_fetch() {
    let mut store = MemoryStore::new();
    let source = ScriptedSource::new();
    let bad = PipelineOptions {
        date_start: "2024-04-18".to_string(),
        date_end: "2024-04-11".to_string(),
        full_refresh: true,
    };

    let result = pipeline::run(&bad, &five_locations(), &mut store, &source, today());

    assert!(matches!(result, Err(pipeline::PipelineError::InvalidDate(_))));
    assert!(source.called().is_empty());
}

#[test]
fn test_forecast_failure_does_not_abort_run() {
    // one-day range: far too short for any model
    let mut store = MemoryStore::new();
    let source = ScriptedSource::new();
    let one_day = PipelineOptions {
        date_start: "2024-04-11".to_string(),
        date_end: "2024-04-11".to_string(),
        full_refresh: false,
    };

    let summary = pipeline::run(&one_day, &five_locations(), &mut store, &source, today()).unwrap();

    assert_eq!(source.called().len(), 5);
    for outcome in &summary.locations {
        assert!(matches!(outcome.forecast, ForecastOutcome::Failed(_)), "{:?}", outcome);
    }
}
