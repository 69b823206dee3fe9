/// Location registry loaded from TOML
///
/// Locations are the geographic points the service ingests weather for.
/// The order in the file is the processing order for a run, which matters
/// when a fetch failure truncates the remaining list.
///
/// ```toml
/// [[locations]]
/// name = "Paris"
/// latitude = 48.8566
/// longitude = 2.3522
/// ```

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::config::ConfigError;
use crate::model::Location;

// ============================================================================
// TOML Configuration Structures
// ============================================================================

/// Root TOML structure
#[derive(Debug, Deserialize)]
pub struct LocationsFile {
    pub locations: Vec<Location>,
}

// ============================================================================
// Loading and Validation
// ============================================================================

/// Load and validate locations from a TOML file
pub fn load_locations<P: AsRef<Path>>(path: P) -> Result<Vec<Location>, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_locations(&content)
}

/// Parse and validate locations from TOML text
pub fn parse_locations(content: &str) -> Result<Vec<Location>, ConfigError> {
    let file: LocationsFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
        what: "locations".into(),
        reason: e.to_string(),
    })?;

    validate_locations(&file.locations)?;
    Ok(file.locations)
}

/// Checks names are present and unique and coordinates are on the globe.
pub fn validate_locations(locations: &[Location]) -> Result<(), ConfigError> {
    if locations.is_empty() {
        return Err(ConfigError::Invalid("no locations configured".into()));
    }

    let mut seen = HashSet::new();
    for location in locations {
        if location.name.trim().is_empty() {
            return Err(ConfigError::Invalid("location with an empty name".into()));
        }
        if !seen.insert(location.name.as_str()) {
            return Err(ConfigError::Invalid(format!("duplicate location '{}'", location.name)));
        }
        if !(-90.0..=90.0).contains(&location.latitude) {
            return Err(ConfigError::Invalid(format!(
                "latitude {} for '{}' is outside [-90, 90]",
                location.latitude, location.name
            )));
        }
        if !(-180.0..=180.0).contains(&location.longitude) {
            return Err(ConfigError::Invalid(format!(
                "longitude {} for '{}' is outside [-180, 180]",
                location.longitude, location.name
            )));
        }
    }

    Ok(())
}

/// Looks up a location by name. Returns `None` if not found.
pub fn find_location<'a>(locations: &'a [Location], name: &str) -> Option<&'a Location> {
    locations.iter().find(|l| l.name == name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
