//! Ordered fallback over several providers
//!
//! For each operation the first capable provider that returns data wins.
//! Providers without the capability are skipped. An error from a provider
//! stops the chain and is returned to the caller; later providers are not
//! tried.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Capabilities, WeatherProvider};
use crate::data::{EToData, GeoCoordinates, Pws, WateringData, WeatherData};
use crate::error::CodedError;

pub struct CompositeWeatherProvider {
    providers: Vec<Arc<dyn WeatherProvider>>,
}

impl CompositeWeatherProvider {
    pub fn new(providers: Vec<Arc<dyn WeatherProvider>>) -> Self {
        Self { providers }
    }

    fn capable(
        &self,
        has: fn(&Capabilities) -> bool,
    ) -> impl Iterator<Item = &Arc<dyn WeatherProvider>> {
        self.providers
            .iter()
            .filter(move |provider| has(&provider.capabilities()))
    }
}

#[async_trait]
impl WeatherProvider for CompositeWeatherProvider {
    fn name(&self) -> &str {
        "composite"
    }

    fn capabilities(&self) -> Capabilities {
        self.providers
            .iter()
            .fold(Capabilities::default(), |acc, p| acc.union(p.capabilities()))
    }

    async fn watering_data(
        &self,
        coordinates: GeoCoordinates,
        pws: Option<&Pws>,
    ) -> Result<Option<Vec<WateringData>>, CodedError> {
        for provider in self.capable(|c| c.watering_data) {
            match provider.watering_data(coordinates, pws).await? {
                Some(data) if !data.is_empty() => return Ok(Some(data)),
                _ => tracing::debug!(provider = provider.name(), "no watering data, trying next"),
            }
        }
        Ok(None)
    }

    async fn weather_data(
        &self,
        coordinates: GeoCoordinates,
        pws: Option<&Pws>,
    ) -> Result<Option<WeatherData>, CodedError> {
        for provider in self.capable(|c| c.weather_data) {
            if let Some(data) = provider.weather_data(coordinates, pws).await? {
                return Ok(Some(data));
            }
            tracing::debug!(provider = provider.name(), "no weather data, trying next");
        }
        Ok(None)
    }

    async fn eto_data(
        &self,
        coordinates: GeoCoordinates,
        pws: Option<&Pws>,
    ) -> Result<Option<EToData>, CodedError> {
        for provider in self.capable(|c| c.eto_data) {
            if let Some(data) = provider.eto_data(coordinates, pws).await? {
                return Ok(Some(data));
            }
            tracing::debug!(provider = provider.name(), "no ETo data, trying next");
        }
        Ok(None)
    }

    fn should_cache_watering_scale(&self) -> bool {
        self.providers
            .iter()
            .any(|p| p.should_cache_watering_scale())
    }

    fn supports_pws(&self) -> bool {
        self.providers.iter().any(|p| p.supports_pws())
    }
}
