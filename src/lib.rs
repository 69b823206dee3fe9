//! Weather ingestion and temperature forecasting for a fixed set of locations.
//!
//! A run validates the requested date range, works out what each location
//! is missing from the store, fetches the gaps from the timeline API,
//! writes them idempotently, and forecasts temperature per location.

pub mod config;
pub mod dates;
pub mod forecast;
pub mod ingest;
pub mod locations;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod reconcile;
pub mod store;
