//! Core data models for the watering-scale service
//!
//! This module contains the value types that flow between weather providers,
//! adjustment methods and the service entry point.

pub mod options;

pub use options::AdjustmentOptions;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CodedError, ErrorCode};

/// Sentinel some vendors use for "not measured"
pub const MISSING_SENTINEL: f64 = -999.0;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinates {
    latitude: f64,
    longitude: f64,
}

impl GeoCoordinates {
    /// Creates validated coordinates
    ///
    /// # Returns
    /// * `Err(CodedError)` with `InvalidLocationFormat` if either value is not
    ///   finite or lies outside [-90, 90] / [-180, 180]
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CodedError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CodedError::new(
                ErrorCode::InvalidLocationFormat,
                format!("Latitude {} is outside [-90, 90]", latitude),
            ));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CodedError::new(
                ErrorCode::InvalidLocationFormat,
                format!("Longitude {} is outside [-180, 180]", longitude),
            ));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Key used when caching per-location data (`"lat;lon"`)
    pub fn cache_key(&self) -> String {
        format!("{};{}", self.latitude, self.longitude)
    }
}

impl fmt::Display for GeoCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

impl FromStr for GeoCoordinates {
    type Err = CodedError;

    /// Parses `"lat,lon"`, tolerating whitespace around each number
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            CodedError::new(
                ErrorCode::InvalidLocationFormat,
                format!("'{}' is not a 'lat,lon' pair", s),
            )
        };
        let (lat, lon) = s.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;
        Self::new(lat, lon)
    }
}

/// Personal weather station credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pws {
    pub id: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: String,
}

impl Pws {
    /// Validates the station ID (alphanumeric) and API key (32 lowercase hex digits)
    ///
    /// An absent ID is allowed; some providers key only on the API key.
    pub fn new(id: Option<String>, api_key: impl Into<String>) -> Result<Self, CodedError> {
        let api_key = api_key.into();
        if let Some(id) = &id {
            if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(CodedError::bare(ErrorCode::InvalidPwsId));
            }
        }
        if api_key.len() != 32
            || !api_key
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(CodedError::bare(ErrorCode::InvalidPwsApiKey));
        }
        Ok(Self { id, api_key })
    }

    pub fn id_or_empty(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }
}

/// Identifies which provider produced a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    OpenMeteo,
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "mock")]
    Mock,
}

impl ProviderId {
    /// Short tag sent to controllers in diagnostics
    pub fn short_id(self) -> &'static str {
        match self {
            ProviderId::OpenMeteo => "OpenMeteo",
            ProviderId::Local => "local",
            ProviderId::Mock => "mock",
        }
    }
}

/// Weather over one 24 hour window
///
/// Temperatures are Fahrenheit, humidity percent, wind mph, radiation
/// kWh/m²/day and precipitation inches. Unmeasured fields are `NaN` or
/// [`MISSING_SENTINEL`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WateringData {
    pub provider: ProviderId,
    /// Unix seconds at the start of the window
    pub period_start_time: i64,
    pub temp: f64,
    pub min_temp: f64,
    pub max_temp: f64,
    pub humidity: f64,
    pub min_humidity: f64,
    pub max_humidity: f64,
    pub wind_speed: f64,
    /// Height the wind was measured at, in metres
    pub wind_height: f64,
    pub solar_radiation: f64,
    pub precip: f64,
    pub raining: bool,
}

/// Samples used for ETo share the watering-window shape
pub type EToData = WateringData;

/// Returns true when a measurement is usable
pub fn is_present(value: f64) -> bool {
    value.is_finite() && value != MISSING_SENTINEL
}

/// Forecast for one future day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    /// Unix seconds for the start of the day
    pub date: i64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub precip: f64,
    pub description: String,
}

/// Current conditions and forecast for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    pub provider: ProviderId,
    pub temp: f64,
    pub humidity: f64,
    pub wind: f64,
    pub raining: bool,
    pub description: String,
    pub min_temp: f64,
    pub max_temp: f64,
    pub precip: f64,
    pub forecast: Vec<ForecastDay>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_parse_with_whitespace() {
        let coords: GeoCoordinates = " 40.7128 , -74.006 ".parse().expect("should parse");
        assert!((coords.latitude() - 40.7128).abs() < 1e-9);
        assert!((coords.longitude() + 74.006).abs() < 1e-9);
    }

    #[test]
    fn test_coordinates_reject_out_of_range() {
        let err = GeoCoordinates::new(91.0, 0.0).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidLocationFormat);
        assert!(GeoCoordinates::new(0.0, -180.5).is_err());
        assert!(GeoCoordinates::new(f64::NAN, 0.0).is_err());
        assert!("Boston".parse::<GeoCoordinates>().is_err());
        assert!("1,2,3".parse::<GeoCoordinates>().is_err());
    }

    #[test]
    fn test_coordinates_cache_key_and_display() {
        let coords = GeoCoordinates::new(1.5, -2.25).expect("valid");
        assert_eq!(coords.cache_key(), "1.5;-2.25");
        assert_eq!(coords.to_string(), "1.5,-2.25");
    }

    #[test]
    fn test_pws_validation() {
        let key = "0123456789abcdef0123456789abcdef";
        assert!(Pws::new(Some("KMABOSTO32".to_string()), key).is_ok());
        assert!(Pws::new(None, key).is_ok());

        let bad_id = Pws::new(Some("KMA-BOS".to_string()), key).unwrap_err();
        assert_eq!(bad_id.code, ErrorCode::InvalidPwsId);

        let bad_key = Pws::new(Some("KMABOSTO32".to_string()), "0123ABCD").unwrap_err();
        assert_eq!(bad_key.code, ErrorCode::InvalidPwsApiKey);

        let upper = Pws::new(None, "0123456789ABCDEF0123456789ABCDEF").unwrap_err();
        assert_eq!(upper.code, ErrorCode::InvalidPwsApiKey);
    }

    #[test]
    fn test_pws_key_is_never_serialized() {
        let pws = Pws::new(Some("STATION1".to_string()), "0123456789abcdef0123456789abcdef")
            .expect("valid");
        let json = serde_json::to_string(&pws).expect("serialize");
        assert!(!json.contains("0123456789abcdef"), "API key leaked: {}", json);
    }

    #[test]
    fn test_is_present_rejects_sentinels() {
        assert!(is_present(0.0));
        assert!(!is_present(f64::NAN));
        assert!(!is_present(f64::INFINITY));
        assert!(!is_present(MISSING_SENTINEL));
    }
}
