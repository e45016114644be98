//! Local personal weather station provider
//!
//! A station pushes Weather Underground style uploads (`tempf`, `humidity`,
//! `dailyrainin`, ...) which are kept in a bounded buffer covering the last
//! 24 hours. Watering and ETo requests aggregate that buffer.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Capabilities, WeatherProvider};
use crate::cache::CacheManager;
use crate::data::{EToData, GeoCoordinates, ProviderId, Pws, WateringData, WeatherData};
use crate::error::{CodedError, ErrorCode};

/// Value stations send for a sensor with no reading
const NO_READING: f64 = -9999.0;

/// Window aggregated for one watering day, in seconds
const WINDOW_SECS: i64 = 24 * 60 * 60;

/// The buffer must span at least this long to count as a full day
const MIN_SPAN_SECS: i64 = 23 * 60 * 60;

/// Rain within this long of a request counts as currently raining
const RAINING_SECS: i64 = 60 * 60;

/// Station anemometers are assumed to be mounted at the reference height
const WIND_HEIGHT_M: f64 = 2.0;

const PERSISTENCE_KEY: &str = "observations";

/// One upload from the station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Unix seconds
    pub timestamp: i64,
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    /// kWh/m²/day equivalent of the instantaneous reading
    pub solar_radiation: Option<f64>,
    /// Rain since the previous upload, in inches
    pub precip: Option<f64>,
}

/// Bounded, age-pruned queue of observations, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationBuffer {
    observations: VecDeque<Observation>,
    capacity: usize,
    last_rain_epoch: Option<i64>,
    last_rain_count: Option<f64>,
}

impl ObservationBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            observations: VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
            last_rain_epoch: None,
            last_rain_count: None,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Records one upload given as query parameters
    ///
    /// `dailyrainin` is a running daily total, so the precipitation stored
    /// is the increase since the previous upload (or the new total when the
    /// counter reset at midnight). A `rainin` rate above zero marks the time
    /// of the last rain.
    pub fn ingest(&mut self, params: &HashMap<String, String>, now: DateTime<Utc>) -> Observation {
        let timestamp = match params.get("dateutc").map(String::as_str) {
            Some("now") | None => now.timestamp(),
            Some(date) => parse_wu_date(date).unwrap_or_else(|| now.timestamp()),
        };

        let rain_count = measurement(params, "dailyrainin");
        let precip = rain_count.map(|count| match self.last_rain_count {
            Some(last) if count >= last => count - last,
            _ => count,
        });

        let observation = Observation {
            timestamp,
            temp: measurement(params, "tempf"),
            humidity: measurement(params, "humidity"),
            wind_speed: measurement(params, "windspeedmph"),
            solar_radiation: measurement(params, "solarradiation").map(|w| w * 24.0 / 1000.0),
            precip,
        };

        if measurement(params, "rainin").is_some_and(|rate| rate > 0.0) {
            self.last_rain_epoch = Some(timestamp);
        }
        if rain_count.is_some() {
            self.last_rain_count = rain_count;
        }

        self.push(observation.clone());
        observation
    }

    /// Adds an observation, evicting the oldest when full
    pub fn push(&mut self, observation: Observation) {
        if self.observations.len() >= self.capacity {
            self.observations.pop_back();
        }
        self.observations.push_front(observation);
    }

    /// Drops observations older than the aggregation window
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now.timestamp() - WINDOW_SECS;
        self.observations.retain(|obs| obs.timestamp > cutoff);
    }

    fn raining(&self, now: DateTime<Utc>) -> bool {
        self.last_rain_epoch
            .is_some_and(|epoch| now.timestamp() - epoch < RAINING_SECS)
    }

    /// Aggregates the last 24 hours into one window
    ///
    /// # Returns
    /// * `Err(CodedError)` with `InsufficientWeatherData` if the buffer spans
    ///   less than 23 hours or a required measurement never appeared
    pub fn aggregate(&mut self, now: DateTime<Utc>) -> Result<WateringData, CodedError> {
        self.prune(now);

        let (newest, oldest) = match (self.observations.front(), self.observations.back()) {
            (Some(newest), Some(oldest)) => (newest.timestamp, oldest.timestamp),
            _ => return Err(insufficient()),
        };
        if newest - oldest < MIN_SPAN_SECS {
            return Err(insufficient());
        }

        let temp = Stats::collect(self.observations.iter().map(|o| o.temp));
        let humidity = Stats::collect(self.observations.iter().map(|o| o.humidity));
        let wind = Stats::collect(self.observations.iter().map(|o| o.wind_speed));
        let solar = Stats::collect(self.observations.iter().map(|o| o.solar_radiation));
        let precip = Stats::collect(self.observations.iter().map(|o| o.precip));

        if temp.count == 0 || humidity.count == 0 || precip.count == 0 {
            return Err(insufficient());
        }

        Ok(WateringData {
            provider: ProviderId::Local,
            period_start_time: oldest,
            temp: temp.mean(),
            min_temp: temp.min,
            max_temp: temp.max,
            humidity: humidity.mean(),
            min_humidity: humidity.min,
            max_humidity: humidity.max,
            wind_speed: wind.mean(),
            wind_height: WIND_HEIGHT_M,
            solar_radiation: solar.mean(),
            precip: precip.sum,
            raining: self.raining(now),
        })
    }

    /// Latest readings for display
    pub fn current(&mut self, now: DateTime<Utc>) -> Option<WeatherData> {
        self.prune(now);
        let latest = self.observations.front()?;
        let precip: f64 = self.observations.iter().filter_map(|o| o.precip).sum();
        let temp = Stats::collect(self.observations.iter().map(|o| o.temp));

        Some(WeatherData {
            provider: ProviderId::Local,
            temp: latest.temp.unwrap_or(f64::NAN),
            humidity: latest.humidity.unwrap_or(f64::NAN),
            wind: latest.wind_speed.unwrap_or(f64::NAN),
            raining: self.raining(now),
            description: String::new(),
            min_temp: temp.min,
            max_temp: temp.max,
            precip: (precip * 100.0).round() / 100.0,
            forecast: Vec::new(),
        })
    }
}

fn insufficient() -> CodedError {
    CodedError::new(
        ErrorCode::InsufficientWeatherData,
        "There is insufficient data from the local PWS",
    )
}

fn measurement(params: &HashMap<String, String>, key: &str) -> Option<f64> {
    params
        .get(key)?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v != NO_READING)
}

/// Parses `YYYY-MM-DD HH:MM:SS` (UTC), the format stations send
fn parse_wu_date(date: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(date.trim(), "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

#[derive(Debug)]
struct Stats {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl Stats {
    fn collect(values: impl Iterator<Item = Option<f64>>) -> Self {
        values.flatten().fold(
            Stats {
                count: 0,
                sum: 0.0,
                min: f64::NAN,
                max: f64::NAN,
            },
            |acc, v| Stats {
                count: acc.count + 1,
                sum: acc.sum + v,
                min: if acc.count == 0 { v } else { acc.min.min(v) },
                max: if acc.count == 0 { v } else { acc.max.max(v) },
            },
        )
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Provider backed by uploads from a station on the local network
pub struct LocalWeatherProvider {
    buffer: Mutex<ObservationBuffer>,
    persistence: Option<CacheManager>,
}

impl LocalWeatherProvider {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(ObservationBuffer::new(capacity)),
            persistence: None,
        }
    }

    /// Restores a previously saved buffer and saves to the same place later
    pub fn with_persistence(capacity: usize, cache: CacheManager) -> Self {
        let mut buffer = cache
            .read::<ObservationBuffer>(PERSISTENCE_KEY)
            .map(|cached| cached.data)
            .unwrap_or_else(|| ObservationBuffer::new(capacity));
        buffer.capacity = capacity.max(1);
        buffer.prune(Utc::now());
        tracing::info!(observations = buffer.len(), "restored local PWS observations");

        Self {
            buffer: Mutex::new(buffer),
            persistence: Some(cache),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ObservationBuffer> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records one station upload
    pub fn ingest(&self, params: &HashMap<String, String>) -> Observation {
        let observation = self.lock().ingest(params, Utc::now());
        tracing::debug!(?observation, "captured PWS observation");
        observation
    }

    /// Writes the buffer to disk if persistence is enabled
    pub fn save(&self) -> std::io::Result<()> {
        let Some(cache) = &self.persistence else {
            return Ok(());
        };
        let mut buffer = self.lock().clone();
        buffer.prune(Utc::now());
        cache.write(PERSISTENCE_KEY, &buffer, Duration::seconds(WINDOW_SECS))
    }

    pub fn observation_count(&self) -> usize {
        self.lock().len()
    }
}

impl Drop for LocalWeatherProvider {
    fn drop(&mut self) {
        if let Err(err) = self.save() {
            tracing::error!(error = %err, "failed to save local PWS observations");
        }
    }
}

#[async_trait]
impl WeatherProvider for LocalWeatherProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn watering_data(
        &self,
        _coordinates: GeoCoordinates,
        _pws: Option<&Pws>,
    ) -> Result<Option<Vec<WateringData>>, CodedError> {
        let window = self.lock().aggregate(Utc::now())?;
        Ok(Some(vec![window]))
    }

    async fn weather_data(
        &self,
        _coordinates: GeoCoordinates,
        _pws: Option<&Pws>,
    ) -> Result<Option<WeatherData>, CodedError> {
        Ok(self.lock().current(Utc::now()))
    }

    async fn eto_data(
        &self,
        _coordinates: GeoCoordinates,
        _pws: Option<&Pws>,
    ) -> Result<Option<EToData>, CodedError> {
        let window = self.lock().aggregate(Utc::now())?;
        Ok(Some(window))
    }

    fn supports_pws(&self) -> bool {
        true
    }
}
