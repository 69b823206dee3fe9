//! Coverage reconciliation.
//!
//! Compares what a caller asked for with what the store already holds for
//! one location and works out the smallest range that still has to be
//! fetched. Every location is reconciled on its own: the result is a value
//! handed back to the caller, never a change to a shared range.
//!
//! Narrowing only ever trims one edge, and only when the stored dates form
//! an unbroken run. Anything less clear-cut falls back to fetching the whole
//! requested range, since the writer skips what already exists anyway.

use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;

use crate::logging::{self, Component};
use crate::model::{CoverageDecision, DATE_FORMAT, DateRange, Location, MalformedRecordError};
use crate::store::WeatherStore;

/// Outcome of reconciling one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub decision: CoverageDecision,
    /// Range to fetch. `None` exactly when the decision is `Complete`.
    pub fetch: Option<DateRange>,
}

impl Reconciliation {
    fn fetch_all(decision: CoverageDecision, requested: DateRange) -> Self {
        Self {
            decision,
            fetch: Some(requested),
        }
    }

    pub fn needs_fetch(&self) -> bool {
        self.fetch.is_some()
    }
}

/// Decides what to fetch for `requested` given the dates already stored.
///
/// Dates outside `requested` are ignored.
pub fn reconcile(requested: DateRange, persisted: &BTreeSet<NaiveDate>) -> Reconciliation {
    let inside: Vec<NaiveDate> = persisted
        .iter()
        .copied()
        .filter(|d| requested.contains(*d))
        .collect();

    // BTreeSet iteration is ordered, so first/last are min/max
    let (persisted_min, persisted_max) = match (inside.first(), inside.last()) {
        (Some(min), Some(max)) => (*min, *max),
        _ => return Reconciliation::fetch_all(CoverageDecision::Empty, requested),
    };

    let persisted_span = (persisted_max - persisted_min).num_days();
    let contiguous = inside.len() as i64 == persisted_span + 1;

    if persisted_span == requested.span_days() && contiguous {
        return Reconciliation {
            decision: CoverageDecision::Complete,
            fetch: None,
        };
    }

    if !contiguous {
        return Reconciliation::fetch_all(CoverageDecision::Incomplete, requested);
    }

    let overlaps = requested.start() <= persisted_max && requested.end() >= persisted_min;
    if overlaps {
        if persisted_min == requested.start() && requested.end() > persisted_max {
            if let Some(tail) = DateRange::new(persisted_max + Duration::days(1), requested.end()) {
                return Reconciliation {
                    decision: CoverageDecision::PartialTail,
                    fetch: Some(tail),
                };
            }
        }
        if persisted_max == requested.end() && requested.start() < persisted_min {
            if let Some(head) = DateRange::new(requested.start(), persisted_min - Duration::days(1)) {
                return Reconciliation {
                    decision: CoverageDecision::PartialHead,
                    fetch: Some(head),
                };
            }
        }
    }

    Reconciliation::fetch_all(CoverageDecision::Incomplete, requested)
}

/// Parses stored date strings and reconciles them.
///
/// Fails on the first value that isn't a `YYYY-MM-DD` date.
pub fn reconcile_raw(
    city: &str,
    requested: DateRange,
    raw_dates: &[String],
) -> Result<Reconciliation, MalformedRecordError> {
    let mut persisted = BTreeSet::new();
    for raw in raw_dates {
        let date = NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| MalformedRecordError {
            city: city.to_string(),
            value: raw.clone(),
        })?;
        persisted.insert(date);
    }
    Ok(reconcile(requested, &persisted))
}

/// Reconciles one location against the store.
///
/// Never fails the run: a malformed stored record or a store error is
/// logged and the location is treated as `Empty`, i.e. fully re-fetched.
pub fn reconcile_location<S: WeatherStore + ?Sized>(
    store: &mut S,
    location: &Location,
    requested: DateRange,
) -> Reconciliation {
    let city = location.name.as_str();

    let raw_dates = match store.persisted_dates(city, &requested) {
        Ok(dates) => dates,
        Err(e) => {
            logging::warn(
                Component::Store,
                Some(city),
                &format!("Coverage lookup failed, re-fetching {}: {}", requested, e),
            );
            return Reconciliation::fetch_all(CoverageDecision::Empty, requested);
        }
    };

    let result = match reconcile_raw(city, requested, &raw_dates) {
        Ok(result) => result,
        Err(e) => {
            logging::warn(
                Component::Reconcile,
                Some(city),
                &format!("{}; re-fetching {}", e, requested),
            );
            Reconciliation::fetch_all(CoverageDecision::Empty, requested)
        }
    };

    match result.fetch {
        None => logging::info(
            Component::Reconcile,
            Some(city),
            &format!("All dates {} already stored, skipping fetch", requested),
        ),
        Some(range) => logging::info(
            Component::Reconcile,
            Some(city),
            &format!(
                "Coverage {} ({} of {} days stored), fetching {}",
                result.decision,
                raw_dates.len(),
                requested.num_days(),
                range
            ),
        ),
    }

    result
}
