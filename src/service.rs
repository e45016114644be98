//! The watering scale pipeline
//!
//! [`WateringService::calculate`] decodes the request, resolves the site,
//! reuses a scale computed earlier the same local day when the provider
//! allows it, and otherwise runs the selected adjustment method and applies
//! any watering restriction.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::adjustment::{
    round_to, AdjustmentMethod, AdjustmentMethodId, AdjustmentMethodResponse, EToScalingMethod,
    ManualMethod, RainDelayMethod, WateringDataNeed, ZimmermanMethod, RESTRICTION_BIT,
};
use crate::baseline::BaselineEToLookup;
use crate::cache::{CachedScale, WateringScaleCache};
use crate::data::{AdjustmentOptions, GeoCoordinates, Pws, WateringData, WeatherData};
use crate::error::{CodedError, ErrorCode};
use crate::geocoder::{resolve_location, Geocoder};
use crate::providers::WeatherProvider;

/// Precipitation above which the California restriction stops watering, in inches
const CALIFORNIA_PRECIP_LIMIT_IN: f64 = 0.1;

/// Credentials for a personal weather station as sent by the controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PwsCredentials {
    pub id: Option<String>,
    pub key: String,
}

/// One scale calculation request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleRequest {
    /// Method ID with the restriction flag in bit 7
    pub method: u8,
    /// `lat,lon` or a place name
    pub location: String,
    /// Adjustment options, with or without surrounding braces
    pub options: String,
    pub pws: Option<PwsCredentials>,
}

/// What the controller receives
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WateringScaleResult {
    pub scale: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rain_delay: Option<u32>,
    pub raw_data: Value,
    /// Per-day scales when the method computes them, most recent first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scales: Option<Vec<i32>>,
    pub err_code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoCoordinates>,
}

impl WateringScaleResult {
    fn from_error(err: CodedError) -> Self {
        Self {
            scale: None,
            rain_delay: None,
            raw_data: json!({}),
            scales: None,
            err_code: err.code,
            error_message: (!err.message.is_empty()).then_some(err.message),
            location: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.err_code != ErrorCode::NoError
    }
}

/// True when the restriction flag is set and the day was too wet to water
pub fn check_weather_restriction(raw_method: u8, data: &WateringData) -> bool {
    raw_method & RESTRICTION_BIT != 0 && data.precip > CALIFORNIA_PRECIP_LIMIT_IN
}

pub struct WateringService {
    provider: Arc<dyn WeatherProvider>,
    scale_cache: WateringScaleCache,
    geocoder: Option<Arc<dyn Geocoder>>,
    baseline: Option<Arc<BaselineEToLookup>>,
    default_elevation: f64,
}

impl WateringService {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self {
            provider,
            scale_cache: WateringScaleCache::new(),
            geocoder: None,
            baseline: None,
            default_elevation: crate::adjustment::DEFAULT_ELEVATION_M,
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_baseline(mut self, baseline: Arc<BaselineEToLookup>) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn with_default_elevation(mut self, elevation: f64) -> Self {
        self.default_elevation = elevation;
        self
    }

    pub fn scale_cache(&self) -> &WateringScaleCache {
        &self.scale_cache
    }

    fn method(&self, id: AdjustmentMethodId) -> Box<dyn AdjustmentMethod> {
        match id {
            AdjustmentMethodId::Manual => Box::new(ManualMethod),
            AdjustmentMethodId::Zimmerman => Box::new(ZimmermanMethod),
            AdjustmentMethodId::RainDelay => Box::new(RainDelayMethod),
            AdjustmentMethodId::EToScaling => Box::new(EToScalingMethod::new(
                self.baseline.clone(),
                self.default_elevation,
            )),
        }
    }

    /// Calculates the watering scale for a controller request
    ///
    /// Never fails: errors are reported through `err_code`.
    pub async fn calculate(&self, request: &ScaleRequest) -> WateringScaleResult {
        match self.try_calculate(request).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(code = err.code.as_u8(), error = %err.message, "scale calculation failed");
                WateringScaleResult::from_error(err)
            }
        }
    }

    async fn try_calculate(&self, request: &ScaleRequest) -> Result<WateringScaleResult, CodedError> {
        let (method_id, restricted) = AdjustmentMethodId::decode(request.method)?;
        let options = AdjustmentOptions::parse(&request.options)?;

        let pws = resolve_pws(request.pws.as_ref(), &options)?;
        if pws.is_some() && !self.provider.supports_pws() {
            return Err(CodedError::new(
                ErrorCode::PwsNotSupported,
                format!("The {} weather provider cannot use a PWS", self.provider.name()),
            ));
        }

        let coordinates = resolve_location(self.geocoder.as_deref(), &request.location).await?;

        let cacheable = self.provider.should_cache_watering_scale();
        if cacheable {
            if let Some(cached) = self.scale_cache.get_watering_scale(
                request.method,
                coordinates,
                pws.as_ref(),
                &options,
            ) {
                tracing::debug!(%coordinates, method = request.method, "using cached watering scale");
                return Ok(WateringScaleResult {
                    scale: cached.scale,
                    rain_delay: cached.rain_delay,
                    raw_data: cached.raw_data,
                    scales: cached.scales,
                    err_code: ErrorCode::NoError,
                    error_message: None,
                    location: Some(coordinates),
                });
            }
        }

        let method = self.method(method_id);
        let watering = self
            .fetch_watering_data(method.watering_data_need(), restricted, coordinates, pws.as_ref())
            .await?;

        let mut response = method
            .calculate_watering_scale(
                &options,
                &watering,
                coordinates,
                self.provider.as_ref(),
                pws.as_ref(),
            )
            .await?;

        if restricted {
            let data = watering.first().ok_or_else(|| {
                CodedError::new(
                    ErrorCode::InsufficientWeatherData,
                    "Watering restrictions cannot be checked without weather data",
                )
            })?;
            if check_weather_restriction(request.method, data) {
                tracing::info!(%coordinates, precip = data.precip, "watering restricted by recent rain");
                response.scale = Some(0);
            }
        }

        if cacheable && response.error_message.is_none() {
            self.scale_cache.store_watering_scale(
                request.method,
                coordinates,
                pws.as_ref(),
                &options,
                CachedScale {
                    scale: response.scale,
                    raw_data: response.raw_data.clone(),
                    rain_delay: response.rain_delay,
                    scales: response.scales.clone(),
                },
            );
        }

        Ok(into_result(response, coordinates))
    }

    /// Daily watering windows, most recent first, fetched only when the method
    /// or a restriction needs them
    async fn fetch_watering_data(
        &self,
        need: WateringDataNeed,
        restricted: bool,
        coordinates: GeoCoordinates,
        pws: Option<&Pws>,
    ) -> Result<Vec<WateringData>, CodedError> {
        let required = need == WateringDataNeed::Required || restricted;
        if !required && (need == WateringDataNeed::None || !self.provider.capabilities().watering_data)
        {
            return Ok(Vec::new());
        }

        match self.provider.watering_data(coordinates, pws).await {
            Ok(windows) => Ok(windows.unwrap_or_default()),
            Err(err) if !required => {
                tracing::warn!(
                    code = err.code.as_u8(),
                    error = %err.message,
                    "continuing without watering data"
                );
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Average daily baseline ETo at the location, in inches per day
    pub async fn baseline_eto(&self, location: &str) -> Result<f64, CodedError> {
        let coordinates = resolve_location(self.geocoder.as_deref(), location).await?;
        let baseline = self.baseline.as_ref().ok_or_else(|| {
            CodedError::new(ErrorCode::UnexpectedError, "No baseline ETo data is configured")
        })?;
        let eto = baseline.average_daily_eto(coordinates).await?;
        Ok(round_to(eto, 3))
    }

    /// Current conditions and forecast for display
    pub async fn weather(&self, location: &str) -> Result<Option<WeatherData>, CodedError> {
        let coordinates = resolve_location(self.geocoder.as_deref(), location).await?;
        self.provider.weather_data(coordinates, None).await
    }
}

fn into_result(response: AdjustmentMethodResponse, coordinates: GeoCoordinates) -> WateringScaleResult {
    WateringScaleResult {
        scale: response.scale,
        rain_delay: response.rain_delay,
        raw_data: response.raw_data,
        scales: response.scales,
        err_code: ErrorCode::NoError,
        error_message: response.error_message,
        location: Some(coordinates),
    }
}

/// Picks PWS credentials from the request, falling back to the `pws` and `key` options
///
/// # Returns
/// * `Ok(None)` when no credentials were given
/// * `Err(CodedError)` with `InvalidPwsApiKey` when an ID comes without a key,
///   or the validation error from [`Pws::new`]
fn resolve_pws(
    credentials: Option<&PwsCredentials>,
    options: &AdjustmentOptions,
) -> Result<Option<Pws>, CodedError> {
    let (id, key) = match credentials {
        Some(c) => (c.id.clone(), Some(c.key.clone())),
        None => (
            options
                .string("pws")
                .map(|id| id.strip_prefix("pws:").unwrap_or(id).to_string()),
            options.string("key").map(str::to_string),
        ),
    };

    match (id, key) {
        (None, None) => Ok(None),
        (_, None) => Err(CodedError::new(
            ErrorCode::InvalidPwsApiKey,
            "A PWS ID was given without an API key",
        )),
        (id, Some(key)) => Pws::new(id, key).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ProviderId;
    use crate::providers::MockWeatherProvider;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn window(temp: f64, humidity: f64, precip: f64) -> WateringData {
        WateringData {
            provider: ProviderId::Mock,
            period_start_time: 1_700_000_000,
            temp,
            min_temp: temp - 10.0,
            max_temp: temp + 10.0,
            humidity,
            min_humidity: humidity - 10.0,
            max_humidity: humidity + 10.0,
            wind_speed: 4.0,
            wind_height: 2.0,
            solar_radiation: 5.0,
            precip,
            raining: false,
        }
    }

    fn request(method: u8, options: &str) -> ScaleRequest {
        ScaleRequest {
            method,
            location: "40.7128,-74.006".to_string(),
            options: options.to_string(),
            pws: None,
        }
    }

    fn service(provider: MockWeatherProvider) -> WateringService {
        WateringService::new(Arc::new(provider))
    }

    #[tokio::test]
    async fn test_zimmerman_end_to_end() {
        let svc = service(MockWeatherProvider::new("m").with_watering_data(vec![window(85.0, 50.0, 0.0)]));
        let result = svc.calculate(&request(1, "")).await;
        assert_eq!(result.err_code, ErrorCode::NoError);
        assert_eq!(result.scale, Some(140));
        assert!(result.location.is_some());
    }

    #[tokio::test]
    async fn test_zimmerman_reports_scales_for_each_day_of_history() {
        let mock = Arc::new(
            MockWeatherProvider::new("m")
                .with_watering_data(vec![window(85.0, 50.0, 0.0), window(70.0, 30.0, 0.0)])
                .caching_scales(),
        );
        let svc = WateringService::new(mock.clone());

        let result = svc.calculate(&request(1, "")).await;
        assert_eq!(result.scale, Some(140));
        assert_eq!(result.scales, Some(vec![140, 120]));

        let cached = svc.calculate(&request(1, "")).await;
        assert_eq!(cached.scales, Some(vec![140, 120]));
        assert_eq!(mock.watering_calls(), 1);
    }

    #[tokio::test]
    async fn test_eto_only_provider_reporting_rain_stops_watering() {
        let mut sample = window(85.0, 20.0, 0.0);
        sample.raining = true;
        let svc = service(MockWeatherProvider::new("m").with_eto_data(sample));
        let result = svc.calculate(&request(3, "")).await;
        assert_eq!(result.err_code, ErrorCode::NoError);
        assert_eq!(result.scale, Some(0));
        assert_eq!(result.raw_data, json!({ "raining": 1 }));
    }

    #[tokio::test]
    async fn test_unknown_method_is_reported() {
        let svc = service(MockWeatherProvider::new("m"));
        let result = svc.calculate(&request(9, "")).await;
        assert_eq!(result.err_code, ErrorCode::InvalidAdjustmentMethod);
        assert_eq!(result.scale, None);
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_malformed_options_are_reported() {
        let svc = service(MockWeatherProvider::new("m"));
        let result = svc.calculate(&request(0, r#""h":"#)).await;
        assert_eq!(result.err_code, ErrorCode::MalformedAdjustmentOptions);
    }

    #[tokio::test]
    async fn test_manual_does_not_fetch_weather() {
        let mock = Arc::new(MockWeatherProvider::new("m").with_watering_data(vec![window(70.0, 30.0, 0.0)]));
        let svc = WateringService::new(mock.clone());
        let result = svc.calculate(&request(0, "")).await;
        assert_eq!(result.scale, Some(-1));
        assert_eq!(mock.watering_calls(), 0);
    }

    #[tokio::test]
    async fn test_restriction_forces_zero_when_wet() {
        // Would be 100 + 0 + 0 - 40 = 60 without the restriction
        let svc = service(MockWeatherProvider::new("m").with_watering_data(vec![window(70.0, 30.0, 0.2)]));
        let result = svc.calculate(&request(0x81, "")).await;
        assert_eq!(result.err_code, ErrorCode::NoError);
        assert_eq!(result.scale, Some(0));

        let result = svc.calculate(&request(0x01, "")).await;
        assert_eq!(result.scale, Some(60));
    }

    #[tokio::test]
    async fn test_restriction_allows_dry_days_and_fetches_for_manual() {
        let mock = Arc::new(MockWeatherProvider::new("m").with_watering_data(vec![window(70.0, 30.0, 0.05)]));
        let svc = WateringService::new(mock.clone());
        let result = svc.calculate(&request(0x80, "")).await;
        assert_eq!(result.scale, Some(-1));
        assert_eq!(mock.watering_calls(), 1);
    }

    #[tokio::test]
    async fn test_restriction_without_data_is_an_error() {
        let svc = service(MockWeatherProvider::new("m").with_watering_data(vec![]));
        let result = svc.calculate(&request(0x80, "")).await;
        assert_eq!(result.err_code, ErrorCode::InsufficientWeatherData);
    }

    #[tokio::test]
    async fn test_required_fetch_errors_propagate() {
        let svc = service(
            MockWeatherProvider::new("m").with_watering_error(CodedError::bare(ErrorCode::WeatherApiError)),
        );
        let result = svc.calculate(&request(1, "")).await;
        assert_eq!(result.err_code, ErrorCode::WeatherApiError);
        assert_eq!(result.error_message, None);
    }

    #[tokio::test]
    async fn test_pws_rejected_by_provider_without_support() {
        let svc = service(MockWeatherProvider::new("m").with_watering_data(vec![window(70.0, 30.0, 0.0)]));
        let mut req = request(1, "");
        req.pws = Some(PwsCredentials {
            id: Some("KSTATION1".to_string()),
            key: KEY.to_string(),
        });
        let result = svc.calculate(&req).await;
        assert_eq!(result.err_code, ErrorCode::PwsNotSupported);
    }

    #[tokio::test]
    async fn test_invalid_pws_credentials_in_options() {
        let svc = service(MockWeatherProvider::new("m").accepting_pws());
        let options = format!(r#""pws":"pws:bad id!","key":"{}""#, KEY);
        let result = svc.calculate(&request(1, &options)).await;
        assert_eq!(result.err_code, ErrorCode::InvalidPwsId);

        let result = svc.calculate(&request(1, r#""pws":"KSTATION1","key":"short""#)).await;
        assert_eq!(result.err_code, ErrorCode::InvalidPwsApiKey);

        let result = svc.calculate(&request(1, r#""pws":"KSTATION1""#)).await;
        assert_eq!(result.err_code, ErrorCode::InvalidPwsApiKey);
    }

    #[test]
    fn test_resolve_pws_strips_prefix() {
        let raw = format!(r#""pws":"pws:KSTATION1","key":"{}""#, KEY);
        let options = AdjustmentOptions::parse(&raw).expect("options");
        let pws = resolve_pws(None, &options).expect("valid").expect("present");
        assert_eq!(pws.id.as_deref(), Some("KSTATION1"));
        assert!(resolve_pws(None, &AdjustmentOptions::new()).expect("valid").is_none());
    }

    #[tokio::test]
    async fn test_scales_are_cached_when_provider_allows() {
        let mock = Arc::new(
            MockWeatherProvider::new("m")
                .with_watering_data(vec![window(85.0, 50.0, 0.0)])
                .caching_scales(),
        );
        let svc = WateringService::new(mock.clone());

        let first = svc.calculate(&request(1, r#""h":100"#)).await;
        let second = svc.calculate(&request(1, r#""h":100"#)).await;
        assert_eq!(first.scale, second.scale);
        assert_eq!(mock.watering_calls(), 1);

        // Different options miss the cache
        svc.calculate(&request(1, r#""h":50"#)).await;
        assert_eq!(mock.watering_calls(), 2);
        assert_eq!(svc.scale_cache().len(), 2);
    }

    #[tokio::test]
    async fn test_results_with_errors_are_not_cached() {
        let mock = Arc::new(
            MockWeatherProvider::new("m")
                .with_watering_data(vec![window(f64::NAN, 50.0, 0.0)])
                .caching_scales(),
        );
        let svc = WateringService::new(mock.clone());
        let result = svc.calculate(&request(1, "")).await;
        assert_eq!(result.scale, None);
        assert!(result.error_message.is_some());
        assert!(svc.scale_cache().is_empty());
    }

    #[tokio::test]
    async fn test_baseline_without_file_is_unexpected() {
        let svc = service(MockWeatherProvider::new("m"));
        let err = svc.baseline_eto("40,-74").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedError);
    }

    #[test]
    fn test_result_serializes_with_controller_field_names() {
        let result = WateringScaleResult {
            scale: Some(87),
            rain_delay: None,
            raw_data: json!({ "wp": "mock" }),
            scales: None,
            err_code: ErrorCode::NoError,
            error_message: None,
            location: None,
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json, json!({ "scale": 87, "rawData": { "wp": "mock" }, "errCode": 0 }));
    }
}
