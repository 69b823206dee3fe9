/// Weather data ingestion.
///
/// Submodules:
/// - `weather_api`: timeline API client and response parsing.
/// - `writer`: idempotent insert-if-absent of daily and hourly records.

pub mod weather_api;
pub mod writer;
