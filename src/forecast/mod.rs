//! Forecast dispatch.
//!
//! Picks a model from the length of the requested range and runs it over
//! every stored day in that range:
//! - more than 90 days: gradient-boosted trees on lagged features (`boosting`)
//! - otherwise: seasonal ARIMA on the temperature series (`sarima`)

pub mod boosting;
pub mod features;
pub mod metrics;
pub mod sarima;

use std::fmt;

use crate::logging::{self, Component};
use crate::model::{DailyRecord, DateRange, Location, StoreError};
use crate::store::WeatherStore;

/// Ranges spanning more days than this go to the gradient boosting model.
pub const LONG_RANGE_THRESHOLD_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    GradientBoosting,
    SeasonalArima,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::GradientBoosting => write!(f, "gradient-boosting"),
            ModelKind::SeasonalArima => write!(f, "seasonal-arima"),
        }
    }
}

/// Model choice depends only on the span `end - start` in days.
pub fn select_model(range: &DateRange) -> ModelKind {
    if range.span_days() > LONG_RANGE_THRESHOLD_DAYS {
        ModelKind::GradientBoosting
    } else {
        ModelKind::SeasonalArima
    }
}

/// Scores a model reports; each model fills in what it can compute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastMetrics {
    pub mae: Option<f64>,
    pub explained_variance: Option<f64>,
    pub max_error: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastReport {
    pub model: ModelKind,
    /// First predicted value, °F.
    pub predicted_fahrenheit: f64,
    pub predicted_celsius: f64,
    /// Every predicted value, °C rounded to 2 dp.
    pub predictions_celsius: Vec<f64>,
    pub metrics: ForecastMetrics,
    pub notes: Vec<String>,
}

#[derive(Debug)]
pub enum ForecastError {
    InsufficientData { needed: usize, available: usize },
    NoTarget,
    FitFailed(String),
    Store(StoreError),
}

impl fmt::Display for ForecastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecastError::InsufficientData { needed, available } => write!(
                f,
                "Not enough data to forecast: need {} points, have {}",
                needed, available
            ),
            ForecastError::NoTarget => write!(f, "No temperature values in the requested range"),
            ForecastError::FitFailed(msg) => write!(f, "Model fit failed: {}", msg),
            ForecastError::Store(e) => write!(f, "Could not load history: {}", e),
        }
    }
}

impl std::error::Error for ForecastError {}

impl From<StoreError> for ForecastError {
    fn from(e: StoreError) -> Self {
        ForecastError::Store(e)
    }
}

/// A temperature model run over one location's daily history.
pub trait Forecaster {
    fn kind(&self) -> ModelKind;
    fn forecast(&self, days: &[DailyRecord]) -> Result<ForecastReport, ForecastError>;
}

pub fn forecaster_for(kind: ModelKind) -> Box<dyn Forecaster> {
    match kind {
        ModelKind::GradientBoosting => Box::new(boosting::BoostingForecaster::default()),
        ModelKind::SeasonalArima => Box::new(sarima::SarimaForecaster),
    }
}

/// Loads the full requested range for `location` and runs the selected
/// model on it.
pub fn dispatch<S: WeatherStore + ?Sized>(
    store: &mut S,
    location: &Location,
    requested: DateRange,
) -> Result<ForecastReport, ForecastError> {
    let city = location.name.as_str();
    let kind = select_model(&requested);
    let days = store.load_days(city, &requested)?;

    logging::info(
        Component::Model,
        Some(city),
        &format!(
            "Running {} over {} ({} days span, {} stored)",
            kind,
            requested,
            requested.span_days(),
            days.len()
        ),
    );

    let report = forecaster_for(kind).forecast(&days)?;
    log_report(city, &report);
    Ok(report)
}

fn log_report(city: &str, report: &ForecastReport) {
    for note in &report.notes {
        logging::debug(Component::Model, Some(city), note);
    }

    let mut summary = format!(
        "Predicted temperature {:.2}°F / {:.2}°C",
        report.predicted_fahrenheit, report.predicted_celsius
    );
    if let Some(mae) = report.metrics.mae {
        summary.push_str(&format!(", MAE {:.3}", mae));
    }
    if let Some(ev) = report.metrics.explained_variance {
        summary.push_str(&format!(", explained variance {:.3}", ev));
    }
    if let Some(max) = report.metrics.max_error {
        summary.push_str(&format!(", max error {:.3}", max));
    }
    logging::info(Component::Model, Some(city), &summary);
}
