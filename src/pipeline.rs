/// One batch run over the configured locations
///
/// Steps, in order:
/// 1. Validate the requested date range (fatal on failure, before any I/O)
/// 2. With full refresh on, reconcile each location against the store and
///    narrow its fetch range; fully covered locations are not fetched
/// 3. Fetch locations one at a time, in file order; the first fetch failure
///    stops fetching and drops that location and every later one from
///    forecasting
/// 4. Write fetched days and hours (insert-if-absent)
/// 5. Forecast every remaining location over the full requested range

use chrono::NaiveDate;
use std::fmt;

use crate::config::RunConfig;
use crate::dates;
use crate::forecast::{self, ForecastReport};
use crate::ingest::weather_api::WeatherSource;
use crate::ingest::writer::{self, IngestSummary};
use crate::logging::{self, Component};
use crate::model::{CoverageDecision, DateRange, FetchError, InvalidDateError, Location, StoreError};
use crate::reconcile;
use crate::store::WeatherStore;

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// The part of the run configuration the pipeline itself needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub date_start: String,
    pub date_end: String,
    pub full_refresh: bool,
}

impl From<&RunConfig> for PipelineOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            date_start: config.date_start.clone(),
            date_end: config.date_end.clone(),
            full_refresh: config.full_refresh,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForecastOutcome {
    Reported(ForecastReport),
    Failed(String),
    /// Dropped after an earlier fetch failure.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationOutcome {
    pub name: String,
    /// Coverage found by the reconciler; `None` when full refresh is off.
    pub decision: Option<CoverageDecision>,
    /// Range requested from the API; `None` when nothing was fetched.
    pub fetched: Option<DateRange>,
    pub ingest: Option<IngestSummary>,
    pub forecast: ForecastOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    pub location: String,
    pub error: FetchError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub requested: DateRange,
    /// One entry per configured location, in file order.
    pub locations: Vec<LocationOutcome>,
    pub fetch_failure: Option<FetchFailure>,
}

impl RunSummary {
    pub fn outcome(&self, name: &str) -> Option<&LocationOutcome> {
        self.locations.iter().find(|o| o.name == name)
    }

    pub fn forecasts_reported(&self) -> usize {
        self.locations
            .iter()
            .filter(|o| matches!(o.forecast, ForecastOutcome::Reported(_)))
            .count()
    }
}

#[derive(Debug)]
pub enum PipelineError {
    InvalidDate(InvalidDateError),
    Store(StoreError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidDate(e) => write!(f, "Invalid date range: {}", e),
            PipelineError::Store(e) => write!(f, "Store failure: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<InvalidDateError> for PipelineError {
    fn from(e: InvalidDateError) -> Self {
        PipelineError::InvalidDate(e)
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        PipelineError::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub fn run<S, W>(
    options: &PipelineOptions,
    locations: &[Location],
    store: &mut S,
    source: &W,
    today: NaiveDate,
) -> Result<RunSummary, PipelineError>
where
    S: WeatherStore + ?Sized,
    W: WeatherSource + ?Sized,
{
    let requested = dates::validate_for_run(&options.date_start, &options.date_end, today)?;
    logging::info(
        Component::System,
        None,
        &format!(
            "Run over {} ({} days) for {} locations, full refresh {}",
            requested,
            requested.num_days(),
            locations.len(),
            if options.full_refresh { "on" } else { "off" }
        ),
    );

    let mut outcomes: Vec<LocationOutcome> = locations
        .iter()
        .map(|location| LocationOutcome {
            name: location.name.clone(),
            decision: None,
            fetched: None,
            ingest: None,
            forecast: ForecastOutcome::Skipped,
        })
        .collect();

    // Plan: what each location still needs
    let mut plan: Vec<Option<DateRange>> = Vec::with_capacity(locations.len());
    for (location, outcome) in locations.iter().zip(outcomes.iter_mut()) {
        if options.full_refresh {
            let result = reconcile::reconcile_location(store, location, requested);
            outcome.decision = Some(result.decision);
            plan.push(result.fetch);
        } else {
            plan.push(Some(requested));
        }
    }

    let to_fetch: Vec<&str> = locations
        .iter()
        .zip(&plan)
        .filter(|(_, range)| range.is_some())
        .map(|(l, _)| l.name.as_str())
        .collect();
    logging::info(
        Component::System,
        None,
        &format!("Locations to fetch from API: {:?}", to_fetch),
    );

    // Fetch and write, stopping at the first failure
    let mut forecast_limit = locations.len();
    let mut fetch_failure = None;

    for (index, (location, range)) in locations.iter().zip(&plan).enumerate() {
        let Some(range) = range else {
            continue;
        };

        match source.fetch_days(location, range) {
            Ok(days) => {
                let summary = writer::ingest_days(store, location, days)?;
                outcomes[index].fetched = Some(*range);
                outcomes[index].ingest = Some(summary);
            }
            Err(e) => {
                logging::log_fetch_failure(&location.name, "timeline fetch", &e);
                logging::warn(
                    Component::Api,
                    Some(&location.name),
                    "Not all locations have been added to the store; stopping fetch here",
                );
                forecast_limit = index;
                fetch_failure = Some(FetchFailure {
                    location: location.name.clone(),
                    error: e,
                });
                break;
            }
        }
    }

    // Forecast what is left, over the full requested range
    for (location, outcome) in locations.iter().zip(outcomes.iter_mut()).take(forecast_limit) {
        outcome.forecast = match forecast::dispatch(store, location, requested) {
            Ok(report) => ForecastOutcome::Reported(report),
            Err(e) => {
                logging::error(Component::Model, Some(&location.name), &format!("Forecast failed: {}", e));
                ForecastOutcome::Failed(e.to_string())
            }
        };
    }

    let summary = RunSummary {
        requested,
        locations: outcomes,
        fetch_failure,
    };

    let fetched = summary.locations.iter().filter(|o| o.fetched.is_some()).count();
    logging::log_ingest_summary(to_fetch.len(), fetched, to_fetch.len() - fetched);
    logging::info(
        Component::Model,
        None,
        &format!("Forecasts reported for {}/{} locations", summary.forecasts_reported(), forecast_limit),
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::logging::LogLevel;

    #[test]
    fn test_options_from_run_config() {
        let config = RunConfig {
            date_start: "2024-04-01".into(),
            date_end: "2024-04-10".into(),
            database_url: "postgres://localhost/x".into(),
            database_schema: "x".into(),
            full_refresh: true,
            fetch_timeout_secs: 30,
            credentials_file: "c.toml".into(),
            locations_file: "l.toml".into(),
            log_file: None,
            log_level: LogLevel::Info,
            log_timestamps: false,
        };
        let options = PipelineOptions::from(&config);
        assert_eq!(options.date_start, "2024-04-01");
        assert_eq!(options.date_end, "2024-04-10");
        assert!(options.full_refresh);
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::from(InvalidDateError::Unparseable("04/11/2024".into()));
        assert!(err.to_string().starts_with("Invalid date range"));
    }
}
