//! tempcast_service binary
//!
//! Usage:
//!   tempcast_service                                   full batch run
//!   tempcast_service forecast <start> <end> <location> forecast one location
//!
//! Configuration comes from the environment (and `.env`); see `config`.

use chrono::Utc;
use std::error::Error;

use tempcast_service::config::{load_credentials, RunConfig};
use tempcast_service::dates;
use tempcast_service::forecast::{self, ForecastReport};
use tempcast_service::ingest::weather_api::WeatherApiClient;
use tempcast_service::locations::{find_location, load_locations};
use tempcast_service::logging::{self, Component};
use tempcast_service::pipeline::{self, ForecastOutcome, PipelineOptions, RunSummary};
use tempcast_service::store::PgStore;

const USAGE: &str = "usage: tempcast_service [forecast <start> <end> <location>]";

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = RunConfig::from_env()?;
    logging::init_logger(config.log_level, config.log_file.as_deref(), config.log_timestamps);

    match args.as_slice() {
        [] => run_batch(&config),
        [command, start, end, location] if command == "forecast" => run_forecast(&config, start, end, location),
        _ => Err(USAGE.into()),
    }
}

fn run_batch(config: &RunConfig) -> Result<(), Box<dyn Error>> {
    let today = Utc::now().date_naive();
    // Bad dates abort before anything is opened
    dates::validate_for_run(&config.date_start, &config.date_end, today)?;

    let credentials = load_credentials(&config.credentials_file)?;
    let locations = load_locations(&config.locations_file)?;
    logging::info(
        Component::System,
        None,
        &format!("Loaded {} locations from {}", locations.len(), config.locations_file),
    );

    let mut store = PgStore::connect(&config.database_url, &config.database_schema)?;
    store.ensure_schema()?;
    let source = WeatherApiClient::new(&credentials, config.fetch_timeout_secs)?;

    let summary = pipeline::run(&PipelineOptions::from(config), &locations, &mut store, &source, today)?;
    print_summary(&summary);
    Ok(())
}

fn run_forecast(config: &RunConfig, start: &str, end: &str, name: &str) -> Result<(), Box<dyn Error>> {
    let requested = dates::validate_for_run(start, end, Utc::now().date_naive())?;
    let locations = load_locations(&config.locations_file)?;
    let location = find_location(&locations, name)
        .ok_or_else(|| format!("Location '{}' is not in {}", name, config.locations_file))?;

    let mut store = PgStore::connect(&config.database_url, &config.database_schema)?;
    let report = forecast::dispatch(&mut store, location, requested)?;
    print_report(name, &report);
    Ok(())
}

fn print_report(name: &str, report: &ForecastReport) {
    println!("{} ({})", name, report.model);
    for note in &report.notes {
        println!("  {}", note);
    }
    println!(
        "  Predicted temperature: {:.2}°F / {:.2}°C",
        report.predicted_fahrenheit, report.predicted_celsius
    );
    println!("  Predictions (°C): {:?}", report.predictions_celsius);
    if let Some(mae) = report.metrics.mae {
        println!("  Mean Absolute Error: {:.4}", mae);
    }
    if let Some(ev) = report.metrics.explained_variance {
        println!("  Explained Variance: {:.4}", ev);
    }
    if let Some(max) = report.metrics.max_error {
        println!("  Max Error: {:.4}", max);
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\nRun summary for {}", summary.requested);
    for outcome in &summary.locations {
        let decision = outcome.decision.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
        let fetched = outcome.fetched.map(|r| r.to_string()).unwrap_or_else(|| "not fetched".into());
        println!("  {:<20} coverage {:<13} {}", outcome.name, decision, fetched);
        if let Some(ingest) = outcome.ingest {
            println!(
                "    days +{} ({} present), hours +{} ({} present)",
                ingest.days_inserted, ingest.days_skipped, ingest.hours_inserted, ingest.hours_skipped
            );
        }
        match &outcome.forecast {
            ForecastOutcome::Reported(report) => print_report(&outcome.name, report),
            ForecastOutcome::Failed(reason) => println!("    forecast failed: {}", reason),
            ForecastOutcome::Skipped => println!("    forecast skipped"),
        }
    }
    if let Some(failure) = &summary.fetch_failure {
        println!(
            "\nFetch stopped at {}: {}. Later locations were not updated.",
            failure.location, failure.error
        );
    }
}
