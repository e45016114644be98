//! Weather providers
//!
//! A provider may serve any subset of three operations. Each operation
//! returns `Ok(None)` when the provider simply has no data, and the default
//! implementations return an `UnsupportedAdjustmentMethod` error so "not
//! implemented" is never mistaken for "empty".

mod caching;
mod composite;
mod local;
mod mock;
mod open_meteo;

pub use caching::CachingWeatherProvider;
pub use composite::CompositeWeatherProvider;
pub use local::{LocalWeatherProvider, Observation, ObservationBuffer};
pub use mock::MockWeatherProvider;
pub use open_meteo::{OpenMeteoProvider, WeatherError};

use async_trait::async_trait;

use crate::data::{EToData, GeoCoordinates, Pws, WateringData, WeatherData};
use crate::error::{CodedError, ErrorCode};

/// Operations a provider implements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub watering_data: bool,
    pub weather_data: bool,
    pub eto_data: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        watering_data: true,
        weather_data: true,
        eto_data: true,
    };

    /// Capabilities offered by at least one of the two
    pub fn union(self, other: Capabilities) -> Capabilities {
        Capabilities {
            watering_data: self.watering_data || other.watering_data,
            weather_data: self.weather_data || other.weather_data,
            eto_data: self.eto_data || other.eto_data,
        }
    }
}

/// Error returned by operations a provider does not implement
pub fn unsupported(provider: &str, operation: &str) -> CodedError {
    CodedError::new(
        ErrorCode::UnsupportedAdjustmentMethod,
        format!("{} does not support {}", provider, operation),
    )
}

/// A source of weather data
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Human-readable name used in logs and error messages
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Daily watering windows, most recent first
    async fn watering_data(
        &self,
        _coordinates: GeoCoordinates,
        _pws: Option<&Pws>,
    ) -> Result<Option<Vec<WateringData>>, CodedError> {
        Err(unsupported(self.name(), "watering data"))
    }

    /// Current conditions and forecast for display
    async fn weather_data(
        &self,
        _coordinates: GeoCoordinates,
        _pws: Option<&Pws>,
    ) -> Result<Option<WeatherData>, CodedError> {
        Err(unsupported(self.name(), "weather data"))
    }

    /// Inputs for the ETo calculation covering the most recent full day
    async fn eto_data(
        &self,
        _coordinates: GeoCoordinates,
        _pws: Option<&Pws>,
    ) -> Result<Option<EToData>, CodedError> {
        Err(unsupported(self.name(), "ETo data"))
    }

    /// Whether computed scales from this provider may be cached until midnight
    fn should_cache_watering_scale(&self) -> bool {
        false
    }

    /// Whether the provider can read from a personal weather station
    fn supports_pws(&self) -> bool {
        false
    }
}
