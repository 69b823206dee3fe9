//! Run configuration: credentials file, locations file, and environment.
//!
//! Environment variables are read through a lookup function so the parsing
//! can be exercised in tests without touching the process environment.
//! `from_env` loads `.env` first, the same way the integration tests do.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::dates::{DEFAULT_DATE_END, DEFAULT_DATE_START};
use crate::logging::LogLevel;

pub const DEFAULT_CREDENTIALS_FILE: &str = "config/credentials.toml";
pub const DEFAULT_LOCATIONS_FILE: &str = "config/locations.toml";
pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/weather_data_iso";
pub const DEFAULT_DATABASE_SCHEMA: &str = "weather_data_iso";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A configuration file could not be read.
    Read { path: String, reason: String },
    /// A configuration file is not valid TOML for its schema.
    Parse { what: String, reason: String },
    /// Values parsed but are not usable.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, reason } => write!(f, "Cannot read {}: {}", path, reason),
            ConfigError::Parse { what, reason } => write!(f, "Invalid {} file: {}", what, reason),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Weather API credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    /// Timeline endpoint prefix, ending with `/`, e.g.
    /// `https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline/`
    pub base_url: String,
}

pub fn load_credentials<P: AsRef<Path>>(path: P) -> Result<Credentials, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_credentials(&content)
}

pub fn parse_credentials(content: &str) -> Result<Credentials, ConfigError> {
    let credentials: Credentials = toml::from_str(content).map_err(|e| ConfigError::Parse {
        what: "credentials".into(),
        reason: e.to_string(),
    })?;

    if credentials.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("api_key is empty".into()));
    }
    if !credentials.base_url.starts_with("http") {
        return Err(ConfigError::Invalid(format!(
            "base_url '{}' is not an http(s) URL",
            credentials.base_url
        )));
    }

    Ok(credentials)
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Everything a run reads from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub date_start: String,
    pub date_end: String,
    pub database_url: String,
    /// Schema holding the `days` and `hours` collections.
    pub database_schema: String,
    /// When set, the coverage reconciler runs before fetching.
    pub full_refresh: bool,
    pub fetch_timeout_secs: u64,
    pub credentials_file: String,
    pub locations_file: String,
    pub log_file: Option<String>,
    pub log_level: LogLevel,
    /// Prefix console lines with a timestamp.
    pub log_timestamps: bool,
}

impl RunConfig {
    /// Loads `.env` (if any) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let fetch_timeout_secs = match lookup("FETCH_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!("FETCH_TIMEOUT_SECS '{}' is not a number", raw))
            })?,
            None => DEFAULT_FETCH_TIMEOUT_SECS,
        };

        let log_level = match lookup("LOG_LEVEL") {
            Some(raw) => LogLevel::parse(&raw)
                .ok_or_else(|| ConfigError::Invalid(format!("LOG_LEVEL '{}' is not recognised", raw)))?,
            None => LogLevel::Info,
        };

        let database_schema = get("DATABASE_SCHEMA", DEFAULT_DATABASE_SCHEMA);
        if !is_valid_identifier(&database_schema) {
            return Err(ConfigError::Invalid(format!(
                "DATABASE_SCHEMA '{}' must be letters, digits and underscores",
                database_schema
            )));
        }

        Ok(RunConfig {
            date_start: get("DATE_START", DEFAULT_DATE_START),
            date_end: get("DATE_END", DEFAULT_DATE_END),
            database_url: get("DATABASE_URL", DEFAULT_DATABASE_URL),
            database_schema,
            full_refresh: lookup("FR_PARAM").map(|v| is_truthy(&v)).unwrap_or(false),
            fetch_timeout_secs,
            credentials_file: get("CREDENTIALS_FILE", DEFAULT_CREDENTIALS_FILE),
            locations_file: get("LOCATIONS_FILE", DEFAULT_LOCATIONS_FILE),
            log_file: lookup("LOG_FILE").filter(|v| !v.trim().is_empty()),
            log_level,
            log_timestamps: lookup("LOG_TIMESTAMPS").map(|v| is_truthy(&v)).unwrap_or(false),
        })
    }
}

/// `1`, `true`, `yes`, `on` (any case) are truthy; everything else is not.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Schema names are interpolated into SQL, so keep them to plain identifiers.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
