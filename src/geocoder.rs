//! Location resolution
//!
//! Controllers send either a `lat,lon` pair or a free-text place name. Pairs
//! are parsed directly; names go through a [`Geocoder`].

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::cache::CacheManager;
use crate::data::GeoCoordinates;
use crate::error::{CodedError, ErrorCode};

const OPEN_METEO_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";

/// How long a resolved place name stays on disk
const GEOCODE_TTL_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("No location found for '{0}'")]
    NotFound(String),
}

impl From<GeocodeError> for CodedError {
    fn from(err: GeocodeError) -> Self {
        match err {
            GeocodeError::NotFound(_) => CodedError::new(ErrorCode::NoLocationFound, err.to_string()),
            _ => {
                tracing::error!(error = %err, "error resolving location");
                CodedError::new(
                    ErrorCode::LocationServiceApiError,
                    "An error occurred while resolving the location",
                )
            }
        }
    }
}

/// Turns a place name into coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, location: &str) -> Result<GeoCoordinates, CodedError>;
}

/// Parses `location` as a `lat,lon` pair, or returns `None` if it is not numeric
///
/// A numeric pair outside the valid ranges is an error rather than a name.
pub fn parse_coordinates(location: &str) -> Option<Result<GeoCoordinates, CodedError>> {
    let (lat, lon) = location.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    Some(GeoCoordinates::new(lat, lon))
}

/// Resolves a location string to coordinates
///
/// # Returns
/// * `Err(CodedError)` with `InvalidLocationFormat` for empty input, `pws:`
///   locations, or names when no geocoder is configured
pub async fn resolve_location(
    geocoder: Option<&dyn Geocoder>,
    location: &str,
) -> Result<GeoCoordinates, CodedError> {
    let location = location.trim();
    if location.is_empty() {
        return Err(CodedError::new(ErrorCode::InvalidLocationFormat, "No location given"));
    }
    if let Some(parsed) = parse_coordinates(location) {
        return parsed;
    }
    if location.starts_with("pws:") {
        return Err(CodedError::new(
            ErrorCode::InvalidLocationFormat,
            "Station locations must be given as coordinates with separate PWS credentials",
        ));
    }

    match geocoder {
        Some(geocoder) => geocoder.geocode(location).await,
        None => Err(CodedError::new(
            ErrorCode::InvalidLocationFormat,
            "Place names cannot be resolved without a geocoder",
        )),
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    latitude: f64,
    longitude: f64,
}

/// Geocoder backed by the Open-Meteo search API
#[derive(Debug, Clone)]
pub struct OpenMeteoGeocoder {
    client: Client,
    base_url: String,
}

impl Default for OpenMeteoGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenMeteoGeocoder {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: OPEN_METEO_GEOCODING_URL.to_string(),
        }
    }

    async fn search(&self, location: &str) -> Result<GeoCoordinates, GeocodeError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("name", location), ("count", "1"), ("format", "json")])
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        parse_search(&text, location)
    }
}

fn parse_search(text: &str, location: &str) -> Result<GeoCoordinates, GeocodeError> {
    let response: SearchResponse = serde_json::from_str(text)?;
    response
        .results
        .into_iter()
        .find_map(|r| GeoCoordinates::new(r.latitude, r.longitude).ok())
        .ok_or_else(|| GeocodeError::NotFound(location.to_string()))
}

#[async_trait]
impl Geocoder for OpenMeteoGeocoder {
    async fn geocode(&self, location: &str) -> Result<GeoCoordinates, CodedError> {
        Ok(self.search(location).await?)
    }
}

/// Keeps resolved names on disk so repeated lookups skip the network
pub struct CachingGeocoder<G> {
    inner: G,
    cache: CacheManager,
}

impl<G: Geocoder> CachingGeocoder<G> {
    pub fn new(inner: G, cache: CacheManager) -> Self {
        Self { inner, cache }
    }

    fn key(location: &str) -> String {
        format!("geocode_{}", location.to_lowercase())
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for CachingGeocoder<G> {
    async fn geocode(&self, location: &str) -> Result<GeoCoordinates, CodedError> {
        let key = Self::key(location);
        if let Some([lat, lon]) = self.cache.read_fresh::<[f64; 2]>(&key) {
            if let Ok(coordinates) = GeoCoordinates::new(lat, lon) {
                tracing::debug!(location, %coordinates, "geocode cache hit");
                return Ok(coordinates);
            }
        }

        let coordinates = self.inner.geocode(location).await?;
        let entry = [coordinates.latitude(), coordinates.longitude()];
        if let Err(err) = self.cache.write(&key, &entry, Duration::days(GEOCODE_TTL_DAYS)) {
            tracing::warn!(location, error = %err, "failed to cache geocode result");
        }
        Ok(coordinates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Resolves every name to the same point and counts calls
    struct FixedGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(&self, _location: &str) -> Result<GeoCoordinates, CodedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            GeoCoordinates::new(42.36, -71.06)
        }
    }

    #[tokio::test]
    async fn test_resolve_coordinate_pairs_directly() {
        let coords = resolve_location(None, "40.7128, -74.006").await.expect("pair");
        assert!((coords.latitude() - 40.7128).abs() < 1e-9);

        let err = resolve_location(None, "95,0").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidLocationFormat);
    }

    #[tokio::test]
    async fn test_resolve_rejects_pws_and_empty_locations() {
        let err = resolve_location(None, "pws:KMABOSTO32").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidLocationFormat);
        let err = resolve_location(None, "   ").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidLocationFormat);
    }

    #[tokio::test]
    async fn test_resolve_names_use_geocoder() {
        let geocoder = FixedGeocoder { calls: AtomicUsize::new(0) };
        let coords = resolve_location(Some(&geocoder as &dyn Geocoder), "Boston, MA").await.expect("name");
        assert_eq!(coords, GeoCoordinates::new(42.36, -71.06).expect("valid"));

        let err = resolve_location(None, "Boston, MA").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidLocationFormat);
    }

    #[tokio::test]
    async fn test_caching_geocoder_hits_disk_on_second_lookup() {
        let dir = TempDir::new().expect("temp dir");
        let cache = CacheManager::with_dir(dir.path().to_path_buf());
        let geocoder = CachingGeocoder::new(FixedGeocoder { calls: AtomicUsize::new(0) }, cache);

        let first = geocoder.geocode("Boston").await.expect("first");
        let second = geocoder.geocode("boston").await.expect("second");

        assert_eq!(first, second);
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_search_takes_first_result() {
        let json = r#"{"results":[{"id":1,"name":"Berlin","latitude":52.52437,"longitude":13.41053}]}"#;
        let coords = parse_search(json, "Berlin").expect("parses");
        assert!((coords.latitude() - 52.52437).abs() < 1e-9);
    }

    #[test]
    fn test_parse_search_without_results_is_not_found() {
        let err = parse_search(r#"{"generationtime_ms":0.5}"#, "Atlantis").unwrap_err();
        assert!(matches!(err, GeocodeError::NotFound(_)));
        let coded = CodedError::from(err);
        assert_eq!(coded.code, ErrorCode::NoLocationFound);
    }

    #[test]
    fn test_parse_search_garbage_is_api_error() {
        let err = parse_search("<html>", "Berlin").unwrap_err();
        assert_eq!(CodedError::from(err).code, ErrorCode::LocationServiceApiError);
    }
}
