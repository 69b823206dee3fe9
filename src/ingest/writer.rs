//! Idempotent ingestion of fetched records.
//!
//! Every write is "insert if absent" on the record's natural key. A record
//! that already exists is left exactly as it is: first write wins, and
//! repeating an ingest with the same input is a no-op.

use crate::ingest::weather_api::DayPayload;
use crate::logging::{self, Component};
use crate::model::{DailyRecord, HourlyRecord, Location, StoreError};
use crate::store::WeatherStore;

/// Counts from one location's ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub days_inserted: usize,
    pub days_skipped: usize,
    pub hours_inserted: usize,
    pub hours_skipped: usize,
}

/// Writes one day for `location`. Returns whether a row was inserted.
pub fn upsert_day<S: WeatherStore + ?Sized>(
    store: &mut S,
    location: &Location,
    record: &DailyRecord,
) -> Result<bool, StoreError> {
    let inserted = if record.city == location.name {
        store.insert_day_if_absent(record)?
    } else {
        let mut tagged = record.clone();
        tagged.city = location.name.clone();
        store.insert_day_if_absent(&tagged)?
    };

    if inserted {
        logging::debug(
            Component::Store,
            Some(&location.name),
            &format!("{} - day inserted", record.datetime),
        );
    } else {
        logging::debug(
            Component::Store,
            Some(&location.name),
            &format!("{} - day already stored", record.datetime),
        );
    }
    Ok(inserted)
}

/// Writes one hour of `date` for `location`. Returns whether a row was inserted.
pub fn upsert_hour<S: WeatherStore + ?Sized>(
    store: &mut S,
    location: &Location,
    date: &str,
    record: &HourlyRecord,
) -> Result<bool, StoreError> {
    let inserted = if record.city == location.name && record.date == date {
        store.insert_hour_if_absent(record)?
    } else {
        let mut tagged = record.clone();
        tagged.city = location.name.clone();
        tagged.date = date.to_string();
        store.insert_hour_if_absent(&tagged)?
    };

    if !inserted {
        logging::debug(
            Component::Store,
            Some(&location.name),
            &format!("{} {} - hour already stored", date, record.datetime),
        );
    }
    Ok(inserted)
}

/// Writes every fetched day and its hours for `location`.
pub fn ingest_days<S: WeatherStore + ?Sized>(
    store: &mut S,
    location: &Location,
    days: Vec<DayPayload>,
) -> Result<IngestSummary, StoreError> {
    let mut summary = IngestSummary::default();

    for payload in days {
        let (day, hours) = payload.into_records(&location.name);

        if upsert_day(store, location, &day)? {
            summary.days_inserted += 1;
        } else {
            summary.days_skipped += 1;
        }

        for hour in &hours {
            if upsert_hour(store, location, &day.datetime, hour)? {
                summary.hours_inserted += 1;
            } else {
                summary.hours_skipped += 1;
            }
        }
    }

    logging::info(
        Component::Store,
        Some(&location.name),
        &format!(
            "Stored {} new days ({} already present), {} new hours ({} already present)",
            summary.days_inserted, summary.days_skipped, summary.hours_inserted, summary.hours_skipped
        ),
    );

    Ok(summary)
}
