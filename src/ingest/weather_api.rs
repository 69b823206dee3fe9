/// Weather timeline API client
///
/// Retrieves historical daily and hourly observations for a single
/// coordinate over an inclusive date range:
///
///   GET {base_url}{lat},{lon}/{start}/{end}?key={api_key}
///
/// The response carries a `days` array; each day has a `datetime` date
/// string, a nested `hours` array, and the weather attributes. Fields the
/// service doesn't model are kept as opaque pass-through.

use serde::Deserialize;
use std::time::Duration;

use crate::config::Credentials;
use crate::model::{DailyRecord, DateRange, FetchError, HourlyRecord, Location, WeatherAttributes};

// ============================================================================
// API Response Structures
// ============================================================================

/// Timeline response. Only `days` is used; location metadata is ignored.
#[derive(Debug, Deserialize)]
pub struct TimelineResponse {
    pub days: Vec<DayPayload>,
}

/// One day as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct DayPayload {
    pub datetime: String,
    #[serde(default)]
    pub hours: Option<Vec<HourPayload>>,
    #[serde(flatten)]
    pub attributes: WeatherAttributes,
}

/// One hour as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct HourPayload {
    /// Hour timestamp, e.g. "13:00:00"
    pub datetime: String,
    #[serde(flatten)]
    pub attributes: WeatherAttributes,
}

impl DayPayload {
    /// Splits the payload into the daily record and its hourly children,
    /// all tagged with `city`.
    pub fn into_records(self, city: &str) -> (DailyRecord, Vec<HourlyRecord>) {
        let date = self.datetime;

        let hours = self
            .hours
            .unwrap_or_default()
            .into_iter()
            .map(|hour| HourlyRecord {
                city: city.to_string(),
                date: date.clone(),
                datetime: hour.datetime,
                attributes: hour.attributes,
            })
            .collect();

        let day = DailyRecord {
            city: city.to_string(),
            datetime: date,
            attributes: self.attributes,
        };

        (day, hours)
    }
}

// ============================================================================
// Fetching
// ============================================================================

/// Anything that can produce daily payloads for a location and range.
///
/// The pipeline only talks to this trait, so runs can be driven by canned
/// responses in tests.
pub trait WeatherSource {
    fn fetch_days(&self, location: &Location, range: &DateRange) -> Result<Vec<DayPayload>, FetchError>;
}

/// Build the timeline URL for a location and range
pub fn build_timeline_url(base_url: &str, location: &Location, range: &DateRange, api_key: &str) -> String {
    format!(
        "{}{},{}/{}/{}?key={}",
        base_url,
        location.latitude,
        location.longitude,
        range.start_str(),
        range.end_str(),
        api_key
    )
}

/// Parse a timeline response body
pub fn parse_timeline_response(body: &str) -> Result<Vec<DayPayload>, FetchError> {
    let response: TimelineResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;
    Ok(response.days)
}

/// Blocking HTTP client for the timeline API
pub struct WeatherApiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl WeatherApiClient {
    pub fn new(credentials: &Credentials, timeout_secs: u64) -> Result<Self, FetchError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: credentials.base_url.clone(),
            api_key: credentials.api_key.clone(),
        })
    }
}

impl WeatherSource for WeatherApiClient {
    fn fetch_days(&self, location: &Location, range: &DateRange) -> Result<Vec<DayPayload>, FetchError> {
        let url = build_timeline_url(&self.base_url, location, range, &self.api_key);

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Http(response.status().as_u16()));
        }

        let body = response
            .text()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        parse_timeline_response(&body)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::validate;

    const SAMPLE: &str = r#"{
        "queryCost": 2,
        "latitude": 48.8566,
        "longitude": 2.3522,
        "resolvedAddress": "48.8566,2.3522",
        "days": [
            {
                "datetime": "2024-04-11",
                "datetimeEpoch": 1712786400,
                "tempmax": 66.1,
                "tempmin": 47.3,
                "temp": 56.4,
                "humidity": 70.2,
                "windspeed": 9.8,
                "conditions": "Partially cloudy",
                "stations": ["07149099999"],
                "hours": [
                    {"datetime": "00:00:00", "temp": 49.9, "humidity": 88.1},
                    {"datetime": "01:00:00", "temp": 49.1, "humidity": 89.0}
                ]
            },
            {
                "datetime": "2024-04-12",
                "temp": 58.0
            }
        ]
    }"#;

    fn paris() -> Location {
        Location {
            name: "Paris".into(),
            latitude: 48.8566,
            longitude: 2.3522,
        }
    }

    #[test]
    fn test_build_timeline_url() {
        let range = validate("2024-04-11", "2024-04-18").unwrap();
        let url = build_timeline_url("https://weather.example.com/timeline/", &paris(), &range, "KEY");
        assert_eq!(
            url,
            "https://weather.example.com/timeline/48.8566,2.3522/2024-04-11/2024-04-18?key=KEY"
        );
    }

    #[test]
    fn test_parse_timeline_response() {
        let days = parse_timeline_response(SAMPLE).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].datetime, "2024-04-11");
        assert_eq!(days[0].attributes.temp, Some(56.4));
        assert_eq!(days[0].hours.as_ref().map(Vec::len), Some(2));
        assert!(days[0].attributes.extra.contains_key("stations"));
        assert!(days[1].hours.is_none());
    }

    #[test]
    fn test_into_records_tags_city_and_date() {
        let mut days = parse_timeline_response(SAMPLE).unwrap();
        let (day, hours) = days.remove(0).into_records("Paris");

        assert_eq!(day.city, "Paris");
        assert_eq!(day.datetime, "2024-04-11");
        assert!(!day.attributes.extra.contains_key("hours"));
        assert_eq!(hours.len(), 2);
        assert!(hours.iter().all(|h| h.city == "Paris" && h.date == "2024-04-11"));
        assert_eq!(hours[1].datetime, "01:00:00");
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        assert!(matches!(parse_timeline_response("<html>quota exceeded</html>"), Err(FetchError::Parse(_))));
        assert!(matches!(parse_timeline_response(r#"{"message": "no days"}"#), Err(FetchError::Parse(_))));
    }
}
