use async_trait::async_trait;
use serde_json::json;

use super::{AdjustmentMethod, AdjustmentMethodId, AdjustmentMethodResponse, WateringDataNeed};
use crate::data::{AdjustmentOptions, GeoCoordinates, Pws, WateringData};
use crate::error::CodedError;
use crate::providers::WeatherProvider;

/// Delay applied when no `d` option is given, in hours
const DEFAULT_DELAY_HOURS: u32 = 24;

/// Asks the controller to pause watering while it is raining
///
/// The scale is never set; only the delay is communicated.
#[derive(Debug, Default, Clone, Copy)]
pub struct RainDelayMethod;

#[async_trait]
impl AdjustmentMethod for RainDelayMethod {
    fn id(&self) -> AdjustmentMethodId {
        AdjustmentMethodId::RainDelay
    }

    fn watering_data_need(&self) -> WateringDataNeed {
        WateringDataNeed::Required
    }

    async fn calculate_watering_scale(
        &self,
        options: &AdjustmentOptions,
        watering_data: &[WateringData],
        _coordinates: GeoCoordinates,
        _provider: &dyn WeatherProvider,
        _pws: Option<&Pws>,
    ) -> Result<AdjustmentMethodResponse, CodedError> {
        let Some(data) = watering_data.first() else {
            return Ok(AdjustmentMethodResponse {
                error_message: Some("No watering data available to detect rain".to_string()),
                ..AdjustmentMethodResponse::unset(json!({ "raining": 0 }))
            });
        };

        let delay = options
            .number("d")
            .filter(|d| *d >= 0.0)
            .map(|d| d.round() as u32)
            .unwrap_or(DEFAULT_DELAY_HOURS);

        Ok(AdjustmentMethodResponse {
            rain_delay: data.raining.then_some(delay),
            watering_data: Some(data.clone()),
            ..AdjustmentMethodResponse::unset(json!({
                "wp": data.provider.short_id(),
                "raining": u8::from(data.raining),
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ProviderId;
    use crate::providers::MockWeatherProvider;

    fn window(raining: bool) -> WateringData {
        WateringData {
            provider: ProviderId::Mock,
            period_start_time: 1_700_000_000,
            temp: 60.0,
            min_temp: 50.0,
            max_temp: 70.0,
            humidity: 90.0,
            min_humidity: 80.0,
            max_humidity: 100.0,
            wind_speed: 3.0,
            wind_height: 2.0,
            solar_radiation: 2.0,
            precip: 0.4,
            raining,
        }
    }

    async fn run(options: &str, data: &[WateringData]) -> AdjustmentMethodResponse {
        let options = AdjustmentOptions::parse(options).expect("options");
        let coords = GeoCoordinates::new(10.0, 10.0).expect("valid");
        RainDelayMethod
            .calculate_watering_scale(&options, data, coords, &MockWeatherProvider::new("m"), None)
            .await
            .expect("rain delay never fails")
    }

    #[tokio::test]
    async fn test_raining_uses_default_delay() {
        let response = run("", &[window(true)]).await;
        assert_eq!(response.scale, None);
        assert_eq!(response.rain_delay, Some(24));
        assert_eq!(response.raw_data, json!({ "wp": "mock", "raining": 1 }));
    }

    #[tokio::test]
    async fn test_raining_uses_configured_delay() {
        let response = run(r#""d":48"#, &[window(true)]).await;
        assert_eq!(response.rain_delay, Some(48));
    }

    #[tokio::test]
    async fn test_dry_sets_no_delay() {
        let response = run(r#""d":48"#, &[window(false)]).await;
        assert_eq!(response.scale, None);
        assert_eq!(response.rain_delay, None);
        assert_eq!(response.raw_data["raining"], 0);
    }

    #[tokio::test]
    async fn test_missing_data_degrades() {
        let response = run("", &[]).await;
        assert_eq!(response.scale, None);
        assert_eq!(response.rain_delay, None);
        assert!(response.error_message.is_some());
    }
}
