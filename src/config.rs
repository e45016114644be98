//! Configuration loading
//!
//! Settings are layered:
//! 1. Defaults in code
//! 2. An optional TOML file (`config/wateringscale.toml`, or `--config`)
//! 3. Environment variables prefixed `WATERINGSCALE__`, e.g.
//!    `WATERINGSCALE__LOCAL__MAX_OBSERVATIONS=500`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::baseline::BaselineEToLookup;
use crate::cache::CacheManager;
use crate::geocoder::{CachingGeocoder, Geocoder, OpenMeteoGeocoder};
use crate::providers::{
    CachingWeatherProvider, CompositeWeatherProvider, LocalWeatherProvider, MockWeatherProvider,
    OpenMeteoProvider, WeatherProvider,
};
use crate::service::WateringService;

const DEFAULT_CONFIG_FILE: &str = "config/wateringscale";

/// Weather sources that can be placed in the provider chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    OpenMeteo,
    /// Observations uploaded by a local station
    Local,
    /// A provider with no data, for offline runs
    Mock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Providers tried in order
    pub providers: Vec<ProviderKind>,

    /// Baseline ETo raster; ETo scaling falls back to a constant without it
    pub baseline_eto_path: Option<PathBuf>,

    /// Site elevation assumed by ETo scaling, in metres
    pub default_elevation_m: f64,

    /// Overrides the platform cache directory
    pub cache_dir: Option<PathBuf>,

    /// Resolve place names through the Open-Meteo geocoder
    pub geocode: bool,

    pub local: LocalSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalSettings {
    /// Keep uploaded observations on disk between runs
    pub persistence: bool,

    /// Upper bound on buffered observations
    pub max_observations: usize,
}

impl Settings {
    /// Loads settings from defaults, the config file and the environment
    ///
    /// # Arguments
    /// * `file` - Explicit config file; when `None` the default file is used if present
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        config::Config::builder()
            .set_default("providers", vec!["open-meteo"])?
            .set_default("default_elevation_m", crate::adjustment::DEFAULT_ELEVATION_M)?
            .set_default("geocode", true)?
            .set_default("local.persistence", true)?
            .set_default("local.max_observations", 1000)?
            .add_source(source)
            .add_source(
                Environment::with_prefix("WATERINGSCALE")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("providers")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Disk cache in the configured or platform directory
    pub fn cache_manager(&self) -> Option<CacheManager> {
        match &self.cache_dir {
            Some(dir) => Some(CacheManager::with_dir(dir.clone())),
            None => CacheManager::new(),
        }
    }

    /// The local station provider, restored from disk when persistence is on
    pub fn local_provider(&self) -> LocalWeatherProvider {
        let capacity = self.local.max_observations;
        match self.cache_manager().filter(|_| self.local.persistence) {
            Some(cache) => LocalWeatherProvider::with_persistence(capacity, cache),
            None => LocalWeatherProvider::new(capacity),
        }
    }

    fn provider(&self, kind: ProviderKind) -> Arc<dyn WeatherProvider> {
        match kind {
            ProviderKind::OpenMeteo => {
                Arc::new(CachingWeatherProvider::new(Arc::new(OpenMeteoProvider::new())))
            }
            ProviderKind::Local => Arc::new(self.local_provider()),
            ProviderKind::Mock => Arc::new(MockWeatherProvider::new("mock")),
        }
    }

    /// Provider chain; a single entry is used directly
    pub fn build_provider(&self) -> Arc<dyn WeatherProvider> {
        let mut providers: Vec<_> = self.providers.iter().map(|k| self.provider(*k)).collect();
        if providers.len() == 1 {
            if let Some(provider) = providers.pop() {
                return provider;
            }
        }
        Arc::new(CompositeWeatherProvider::new(providers))
    }

    fn geocoder(&self) -> Option<Arc<dyn Geocoder>> {
        if !self.geocode {
            return None;
        }
        let geocoder: Arc<dyn Geocoder> = match self.cache_manager() {
            Some(cache) => Arc::new(CachingGeocoder::new(OpenMeteoGeocoder::new(), cache)),
            None => Arc::new(OpenMeteoGeocoder::new()),
        };
        Some(geocoder)
    }

    /// Assembles the service described by these settings
    pub async fn build_service(&self) -> WateringService {
        let mut service = WateringService::new(self.build_provider())
            .with_default_elevation(self.default_elevation_m);
        if let Some(geocoder) = self.geocoder() {
            service = service.with_geocoder(geocoder);
        }
        if let Some(path) = &self.baseline_eto_path {
            service = service.with_baseline(Arc::new(BaselineEToLookup::load(path).await));
        }
        service
    }
}
