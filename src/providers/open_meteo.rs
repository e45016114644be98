//! Open-Meteo weather provider
//!
//! Fetches the past week of hourly observations and folds them into daily
//! watering windows, and fetches current conditions plus a daily forecast
//! for display. All requests ask for imperial units so no conversion is
//! needed before the data reaches the adjustment methods.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use super::{Capabilities, WeatherProvider};
use crate::data::{
    EToData, ForecastDay, GeoCoordinates, ProviderId, Pws, WateringData, WeatherData,
};
use crate::error::{CodedError, ErrorCode};
use crate::timezone::{start_of_local_day, timezone_for};

/// Base URL for the Open-Meteo API
const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Open-Meteo reports wind at 10 m
const WIND_HEIGHT_M: f64 = 10.0;

/// Number of complete past days folded into watering windows
const HISTORY_DAYS: usize = 7;

const HOURS_PER_DAY: usize = 24;

/// Errors that can occur when fetching weather data
#[derive(Debug, Error)]
pub enum WeatherError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Missing expected field in response
    #[error("Missing expected field in response: {0}")]
    MissingField(String),

    /// Fewer hours than a full day were available
    #[error("Only {0} hours of history available")]
    InsufficientData(usize),
}

impl From<WeatherError> for CodedError {
    fn from(err: WeatherError) -> Self {
        match err {
            WeatherError::RequestFailed(_) | WeatherError::ParseError(_) => {
                tracing::error!(error = %err, "error retrieving weather information from Open-Meteo");
                CodedError::new(
                    ErrorCode::WeatherApiError,
                    "An error occurred while retrieving weather information from Open-Meteo",
                )
            }
            WeatherError::MissingField(_) => {
                CodedError::new(ErrorCode::MissingWeatherField, err.to_string())
            }
            WeatherError::InsufficientData(_) => {
                CodedError::new(ErrorCode::InsufficientWeatherData, err.to_string())
            }
        }
    }
}

/// Hourly history response
#[derive(Debug, Deserialize)]
struct HistoryResponse {
    hourly: HourlyHistory,
    current: Option<CurrentPrecipitation>,
}

#[derive(Debug, Deserialize)]
struct HourlyHistory {
    time: Vec<i64>,
    temperature_2m: Vec<Option<f64>>,
    relative_humidity_2m: Vec<Option<f64>>,
    precipitation: Vec<Option<f64>>,
    shortwave_radiation: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct CurrentPrecipitation {
    precipitation: Option<f64>,
}

/// Current conditions and daily forecast response
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentWeather,
    daily: DailyForecast,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
    weather_code: u8,
    precipitation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DailyForecast {
    time: Vec<i64>,
    weather_code: Vec<Option<u8>>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    precipitation_sum: Vec<Option<f64>>,
}

/// Running mean/min/max/sum over values that may be missing
#[derive(Debug, Default)]
struct Summary {
    count: usize,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Summary {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.count += 1;
            self.sum += v;
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        }
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }

    fn min(&self) -> f64 {
        self.min.unwrap_or(f64::NAN)
    }

    fn max(&self) -> f64 {
        self.max.unwrap_or(f64::NAN)
    }
}

/// Client for the Open-Meteo forecast API
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    client: Client,
    base_url: String,
}

impl Default for OpenMeteoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenMeteoProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: OPEN_METEO_BASE_URL.to_string(),
        }
    }

    /// Create a provider with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: OPEN_METEO_BASE_URL.to_string(),
        }
    }

    /// Point the provider at a different API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch the past week of daily watering windows, most recent first
    ///
    /// # Arguments
    /// * `coordinates` - Location of the watering site
    ///
    /// # Returns
    /// * `Ok(Vec<WateringData>)` - Between one and seven complete days
    /// * `Err(WeatherError)` - If the request or parsing fails, or no full day is available
    pub async fn fetch_watering_data(
        &self,
        coordinates: GeoCoordinates,
    ) -> Result<Vec<WateringData>, WeatherError> {
        self.fetch_history(coordinates, HISTORY_DAYS).await
    }

    /// Fetch only the most recent complete day, for ETo
    pub async fn fetch_eto_data(&self, coordinates: GeoCoordinates) -> Result<EToData, WeatherError> {
        let mut windows = self.fetch_history(coordinates, 1).await?;
        windows.pop().ok_or(WeatherError::InsufficientData(0))
    }

    async fn fetch_history(
        &self,
        coordinates: GeoCoordinates,
        days: usize,
    ) -> Result<Vec<WateringData>, WeatherError> {
        let url = format!(
            "{}?latitude={}&longitude={}&hourly=temperature_2m,relative_humidity_2m,precipitation,shortwave_radiation,wind_speed_10m&current=precipitation&temperature_unit=fahrenheit&wind_speed_unit=mph&precipitation_unit=inch&past_days={}&forecast_days=1&timezone=auto&timeformat=unixtime",
            self.base_url,
            coordinates.latitude(),
            coordinates.longitude(),
            days
        );

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let text = response.text().await?;
        let api_response: HistoryResponse = serde_json::from_str(&text)?;

        let cutoff = start_of_local_day(timezone_for(coordinates), Utc::now());
        parse_history(api_response, cutoff, days)
    }

    /// Fetch current conditions and the daily forecast
    pub async fn fetch_weather_data(
        &self,
        coordinates: GeoCoordinates,
    ) -> Result<WeatherData, WeatherError> {
        let url = format!(
            "{}?latitude={}&longitude={}&current=temperature_2m,relative_humidity_2m,wind_speed_10m,weather_code,precipitation&daily=weather_code,temperature_2m_max,temperature_2m_min,precipitation_sum&temperature_unit=fahrenheit&wind_speed_unit=mph&precipitation_unit=inch&timezone={}&timeformat=unixtime",
            self.base_url,
            coordinates.latitude(),
            coordinates.longitude(),
            timezone_for(coordinates).name()
        );

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let text = response.text().await?;
        let api_response: ForecastResponse = serde_json::from_str(&text)?;

        parse_forecast(api_response)
    }
}

/// Fold hourly history into at most `max_days` complete days ending before `cutoff`
fn parse_history(
    response: HistoryResponse,
    cutoff: DateTime<Utc>,
    max_days: usize,
) -> Result<Vec<WateringData>, WeatherError> {
    let hourly = response.hourly;
    let len = hourly.time.len();

    // Validate that all arrays have the same length
    if hourly.temperature_2m.len() != len
        || hourly.relative_humidity_2m.len() != len
        || hourly.precipitation.len() != len
        || hourly.shortwave_radiation.len() != len
        || hourly.wind_speed_10m.len() != len
    {
        return Err(WeatherError::MissingField(
            "hourly arrays have inconsistent lengths".to_string(),
        ));
    }

    let cutoff = cutoff.timestamp();
    let end = hourly.time.iter().position(|&t| t >= cutoff).unwrap_or(len);
    let days = (end / HOURS_PER_DAY).min(max_days);
    if days == 0 {
        return Err(WeatherError::InsufficientData(end));
    }
    let start = end - days * HOURS_PER_DAY;

    let mut windows = Vec::with_capacity(days);
    for day_start in (start..end).step_by(HOURS_PER_DAY) {
        let hours = day_start..day_start + HOURS_PER_DAY;
        let mut temp = Summary::default();
        let mut humidity = Summary::default();
        let mut wind = Summary::default();
        let mut precip = Summary::default();
        let mut radiation = Summary::default();
        for i in hours {
            temp.add(hourly.temperature_2m[i]);
            humidity.add(hourly.relative_humidity_2m[i]);
            wind.add(hourly.wind_speed_10m[i]);
            precip.add(hourly.precipitation[i]);
            radiation.add(hourly.shortwave_radiation[i]);
        }

        windows.push(WateringData {
            provider: ProviderId::OpenMeteo,
            period_start_time: hourly.time[day_start],
            temp: temp.mean(),
            min_temp: temp.min(),
            max_temp: temp.max(),
            humidity: humidity.mean(),
            min_humidity: humidity.min(),
            max_humidity: humidity.max(),
            wind_speed: wind.mean(),
            wind_height: WIND_HEIGHT_M,
            // Hourly mean W/m² summed over a day is Wh/m²
            solar_radiation: radiation.sum / 1000.0,
            precip: precip.sum,
            raining: false,
        });
    }

    windows.reverse();
    if let Some(latest) = windows.first_mut() {
        latest.raining = response
            .current
            .and_then(|c| c.precipitation)
            .is_some_and(|p| p > 0.0);
    }
    Ok(windows)
}

/// Parse the current conditions and forecast response
fn parse_forecast(response: ForecastResponse) -> Result<WeatherData, WeatherError> {
    let current = response.current;
    let daily = response.daily;
    let len = daily.time.len();

    if daily.weather_code.len() != len
        || daily.temperature_2m_max.len() != len
        || daily.temperature_2m_min.len() != len
        || daily.precipitation_sum.len() != len
    {
        return Err(WeatherError::MissingField(
            "daily arrays have inconsistent lengths".to_string(),
        ));
    }
    if len == 0 {
        return Err(WeatherError::MissingField("daily".to_string()));
    }

    let forecast: Vec<ForecastDay> = (0..len)
        .map(|i| ForecastDay {
            date: daily.time[i],
            temp_min: daily.temperature_2m_min[i].unwrap_or(f64::NAN),
            temp_max: daily.temperature_2m_max[i].unwrap_or(f64::NAN),
            precip: daily.precipitation_sum[i].unwrap_or(0.0),
            description: weather_code_description(daily.weather_code[i].unwrap_or(0)).to_string(),
        })
        .collect();

    let today = &forecast[0];
    Ok(WeatherData {
        provider: ProviderId::OpenMeteo,
        temp: current.temperature_2m,
        humidity: current.relative_humidity_2m,
        wind: current.wind_speed_10m,
        raining: current.precipitation.is_some_and(|p| p > 0.0),
        description: weather_code_description(current.weather_code).to_string(),
        min_temp: today.temp_min,
        max_temp: today.temp_max,
        precip: today.precip,
        forecast,
    })
}

/// Describe a WMO weather code
///
/// Codes from WMO (World Meteorological Organization):
/// - 0: Clear sky
/// - 1-3: Mainly clear, partly cloudy, overcast
/// - 45, 48: Fog
/// - 51-57: Drizzle
/// - 61-67: Rain
/// - 71-77: Snow
/// - 80-82: Rain showers
/// - 85-86: Snow showers
/// - 95-99: Thunderstorm
pub fn weather_code_description(code: u8) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51..=57 => "Drizzle",
        61..=67 => "Rain",
        71..=77 => "Snow",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95..=99 => "Thunderstorm",
        _ => "Unknown",
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn name(&self) -> &str {
        "OpenMeteo"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn watering_data(
        &self,
        coordinates: GeoCoordinates,
        _pws: Option<&Pws>,
    ) -> Result<Option<Vec<WateringData>>, CodedError> {
        Ok(Some(self.fetch_watering_data(coordinates).await?))
    }

    async fn weather_data(
        &self,
        coordinates: GeoCoordinates,
        _pws: Option<&Pws>,
    ) -> Result<Option<WeatherData>, CodedError> {
        Ok(Some(self.fetch_weather_data(coordinates).await?))
    }

    async fn eto_data(
        &self,
        coordinates: GeoCoordinates,
        _pws: Option<&Pws>,
    ) -> Result<Option<EToData>, CodedError> {
        Ok(Some(self.fetch_eto_data(coordinates).await?))
    }

    fn should_cache_watering_scale(&self) -> bool {
        true
    }
}
