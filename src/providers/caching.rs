//! Per-location caching around another provider
//!
//! Watering data only changes once a day, so it is kept until the next local
//! midnight of the site. Display data is kept until the next six-hour local
//! boundary. Concurrent requests for the same site share one upstream fetch.
//! Sites whose data has expired are dropped whenever a new site is added.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Capabilities, WeatherProvider};
use crate::cache::Cached;
use crate::data::{EToData, GeoCoordinates, Pws, WateringData, WeatherData};
use crate::error::CodedError;
use crate::timezone::{next_local_midnight, next_six_hour_boundary, timezone_for};

struct Slot<T> {
    cached: Arc<Cached<T>>,
    /// Latest expiry requested for this key
    expires_at: DateTime<Utc>,
}

type Slots<T> = Mutex<HashMap<String, Slot<T>>>;

pub struct CachingWeatherProvider {
    inner: Arc<dyn WeatherProvider>,
    watering: Slots<Option<Vec<WateringData>>>,
    weather: Slots<Option<WeatherData>>,
}

impl CachingWeatherProvider {
    pub fn new(inner: Arc<dyn WeatherProvider>) -> Self {
        Self {
            inner,
            watering: Mutex::default(),
            weather: Mutex::default(),
        }
    }

    /// Stations are keyed by ID, everything else by coordinates
    fn key(coordinates: GeoCoordinates, pws: Option<&Pws>) -> String {
        match pws.and_then(|p| p.id.as_deref()) {
            Some(id) => id.to_string(),
            None => coordinates.cache_key(),
        }
    }

    fn slot<T>(
        slots: &Slots<T>,
        key: String,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Arc<Cached<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut slots = slots.lock().unwrap_or_else(|e| e.into_inner());
        if !slots.contains_key(&key) {
            let before = slots.len();
            slots.retain(|_, slot| slot.expires_at > now);
            if slots.len() < before {
                tracing::debug!(pruned = before - slots.len(), "dropped expired weather cache entries");
            }
        }
        let slot = slots.entry(key).or_insert_with(|| Slot {
            cached: Arc::default(),
            expires_at,
        });
        slot.expires_at = slot.expires_at.max(expires_at);
        slot.cached.clone()
    }
}

#[async_trait]
impl WeatherProvider for CachingWeatherProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn watering_data(
        &self,
        coordinates: GeoCoordinates,
        pws: Option<&Pws>,
    ) -> Result<Option<Vec<WateringData>>, CodedError> {
        let key = Self::key(coordinates, pws);
        let now = Utc::now();
        let expires_at = next_local_midnight(timezone_for(coordinates), now);
        let cached = Self::slot(&self.watering, key.clone(), expires_at, now);

        let inner = self.inner.clone();
        let pws = pws.cloned();
        let result = cached
            .get(
                move || async move {
                    tracing::debug!(key = %key, "fetching watering data");
                    inner.watering_data(coordinates, pws.as_ref()).await
                },
                expires_at,
            )
            .await?;
        Ok(result.value)
    }

    async fn weather_data(
        &self,
        coordinates: GeoCoordinates,
        pws: Option<&Pws>,
    ) -> Result<Option<WeatherData>, CodedError> {
        let key = Self::key(coordinates, pws);
        let now = Utc::now();
        let expires_at = next_six_hour_boundary(timezone_for(coordinates), now);
        let cached = Self::slot(&self.weather, key.clone(), expires_at, now);

        let inner = self.inner.clone();
        let pws = pws.cloned();
        let result = cached
            .get(
                move || async move {
                    tracing::debug!(key = %key, "fetching weather data");
                    inner.weather_data(coordinates, pws.as_ref()).await
                },
                expires_at,
            )
            .await?;
        Ok(result.value)
    }

    async fn eto_data(
        &self,
        coordinates: GeoCoordinates,
        pws: Option<&Pws>,
    ) -> Result<Option<EToData>, CodedError> {
        self.inner.eto_data(coordinates, pws).await
    }

    fn should_cache_watering_scale(&self) -> bool {
        self.inner.should_cache_watering_scale()
    }

    fn supports_pws(&self) -> bool {
        self.inner.supports_pws()
    }
}
