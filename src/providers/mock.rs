//! Provider returning fixed data
//!
//! Used by tests and by the `mock` provider setting to exercise the pipeline
//! without network access. Each operation is unsupported until configured.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{unsupported, Capabilities, WeatherProvider};
use crate::data::{EToData, GeoCoordinates, Pws, WateringData, WeatherData};
use crate::error::CodedError;

#[derive(Debug, Clone)]
enum Canned<T> {
    Data(T),
    Empty,
    Fail(CodedError),
}

impl<T: Clone> Canned<T> {
    fn respond(&self) -> Result<Option<T>, CodedError> {
        match self {
            Canned::Data(data) => Ok(Some(data.clone())),
            Canned::Empty => Ok(None),
            Canned::Fail(err) => Err(err.clone()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockWeatherProvider {
    name: String,
    watering: Option<Canned<Vec<WateringData>>>,
    weather: Option<Canned<WeatherData>>,
    eto: Option<Canned<EToData>>,
    cache_scales: bool,
    pws: bool,
    watering_calls: AtomicUsize,
    eto_calls: AtomicUsize,
}

impl MockWeatherProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_watering_data(mut self, data: Vec<WateringData>) -> Self {
        self.watering = Some(Canned::Data(data));
        self
    }

    pub fn with_watering_error(mut self, err: CodedError) -> Self {
        self.watering = Some(Canned::Fail(err));
        self
    }

    pub fn with_weather_data(mut self, data: WeatherData) -> Self {
        self.weather = Some(Canned::Data(data));
        self
    }

    pub fn with_eto_data(mut self, data: EToData) -> Self {
        self.eto = Some(Canned::Data(data));
        self
    }

    /// Supports ETo but has no data
    pub fn with_eto_none(mut self) -> Self {
        self.eto = Some(Canned::Empty);
        self
    }

    pub fn with_eto_error(mut self, err: CodedError) -> Self {
        self.eto = Some(Canned::Fail(err));
        self
    }

    pub fn caching_scales(mut self) -> Self {
        self.cache_scales = true;
        self
    }

    pub fn accepting_pws(mut self) -> Self {
        self.pws = true;
        self
    }

    pub fn watering_calls(&self) -> usize {
        self.watering_calls.load(Ordering::SeqCst)
    }

    pub fn eto_calls(&self) -> usize {
        self.eto_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherProvider for MockWeatherProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            watering_data: self.watering.is_some(),
            weather_data: self.weather.is_some(),
            eto_data: self.eto.is_some(),
        }
    }

    async fn watering_data(
        &self,
        _coordinates: GeoCoordinates,
        _pws: Option<&Pws>,
    ) -> Result<Option<Vec<WateringData>>, CodedError> {
        self.watering_calls.fetch_add(1, Ordering::SeqCst);
        match &self.watering {
            Some(canned) => canned.respond(),
            None => Err(unsupported(&self.name, "watering data")),
        }
    }

    async fn weather_data(
        &self,
        _coordinates: GeoCoordinates,
        _pws: Option<&Pws>,
    ) -> Result<Option<WeatherData>, CodedError> {
        match &self.weather {
            Some(canned) => canned.respond(),
            None => Err(unsupported(&self.name, "weather data")),
        }
    }

    async fn eto_data(
        &self,
        _coordinates: GeoCoordinates,
        _pws: Option<&Pws>,
    ) -> Result<Option<EToData>, CodedError> {
        self.eto_calls.fetch_add(1, Ordering::SeqCst);
        match &self.eto {
            Some(canned) => canned.respond(),
            None => Err(unsupported(&self.name, "ETo data")),
        }
    }

    fn should_cache_watering_scale(&self) -> bool {
        self.cache_scales
    }

    fn supports_pws(&self) -> bool {
        self.pws
    }
}
