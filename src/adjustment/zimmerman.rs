//! Zimmerman method
//!
//! Compares the latest day's humidity, temperature and precipitation against
//! baseline conditions that call for 100% watering:
//!
//! ```text
//! scale = 100 + (bh - h) * wh + (t - bt) * 4 * wt + (br - p) * 200 * wr
//! ```
//!
//! where the `w` weights are the optional `h`, `t` and `r` percentages divided
//! by 100. The result is clamped to 0..=200 and floored.
//!
//! When the provider returns several days, `scales[i]` is the clamped average
//! of the raw scales of the `i + 1` most recent days. `scales[0]` is the scale.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    clamp_scale, round_to, AdjustmentMethod, AdjustmentMethodId, AdjustmentMethodResponse,
    WateringDataNeed,
};
use crate::data::{is_present, AdjustmentOptions, GeoCoordinates, Pws, WateringData};
use crate::error::CodedError;
use crate::providers::WeatherProvider;

const BASE_HUMIDITY: f64 = 30.0;
const BASE_TEMPERATURE_F: f64 = 70.0;
const BASE_PRECIP_IN: f64 = 0.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct ZimmermanMethod;

/// Optional value that serializes as `null` when unmeasured
fn reading(value: f64, decimals: i32) -> Value {
    if is_present(value) {
        json!(round_to(value, decimals))
    } else {
        Value::Null
    }
}

fn diagnostics(data: &WateringData) -> Value {
    json!({
        "wp": data.provider.short_id(),
        "h": reading(data.humidity, 2),
        "p": reading(data.precip, 2),
        "t": reading(data.temp, 1),
        "raining": u8::from(data.raining),
    })
}

/// Multiplies a factor by its optional percentage weight
fn weighted(options: &AdjustmentOptions, key: &str, factor: f64) -> f64 {
    match options.number(key) {
        Some(percent) => factor * percent / 100.0,
        None => factor,
    }
}

fn is_complete(data: &WateringData) -> bool {
    is_present(data.temp) && is_present(data.humidity) && is_present(data.precip)
}

/// Unclamped scale for one window with all three readings present
fn raw_scale(options: &AdjustmentOptions, data: &WateringData) -> f64 {
    let humidity_base = options.number_or("bh", BASE_HUMIDITY);
    let temp_base = options.number_or("bt", BASE_TEMPERATURE_F);
    let precip_base = options.number_or("br", BASE_PRECIP_IN);

    let humidity_factor = weighted(options, "h", humidity_base - data.humidity);
    let temp_factor = weighted(options, "t", (data.temp - temp_base) * 4.0);
    let precip_factor = weighted(options, "r", (precip_base - data.precip) * 200.0);

    100.0 + humidity_factor + temp_factor + precip_factor
}

/// Rolling averages over the leading run of complete windows, most recent first
pub(crate) fn rolling_scales(options: &AdjustmentOptions, windows: &[WateringData]) -> Vec<i32> {
    let mut sum = 0.0;
    windows
        .iter()
        .take_while(|data| is_complete(data))
        .enumerate()
        .map(|(i, data)| {
            sum += raw_scale(options, data);
            clamp_scale(sum / (i + 1) as f64)
        })
        .collect()
}

#[async_trait]
impl AdjustmentMethod for ZimmermanMethod {
    fn id(&self) -> AdjustmentMethodId {
        AdjustmentMethodId::Zimmerman
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
                error_message: Some("No watering data available".to_string()),
                ..AdjustmentMethodResponse::unset(json!({}))
            });
        };

        if data.raining {
            return Ok(AdjustmentMethodResponse {
                scale: Some(0),
                watering_data: Some(data.clone()),
                ..AdjustmentMethodResponse::unset(json!({ "raining": 1 }))
            });
        }

        let missing: Vec<&str> = [
            ("temp", data.temp),
            ("humidity", data.humidity),
            ("precip", data.precip),
        ]
        .into_iter()
        .filter(|(_, value)| !is_present(*value))
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            tracing::warn!(?missing, provider = data.provider.short_id(), "incomplete watering data");
            return Ok(AdjustmentMethodResponse {
                error_message: Some(format!("Missing weather fields: {}", missing.join(", "))),
                watering_data: Some(data.clone()),
                ..AdjustmentMethodResponse::unset(diagnostics(data))
            });
        }

        let scales = rolling_scales(options, watering_data);
        Ok(AdjustmentMethodResponse {
            scale: scales.first().copied(),
            scales: Some(scales),
            watering_data: Some(data.clone()),
            ..AdjustmentMethodResponse::unset(diagnostics(data))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ProviderId, MISSING_SENTINEL};
    use crate::providers::MockWeatherProvider;

    fn window(temp: f64, humidity: f64, precip: f64) -> WateringData {
        WateringData {
            provider: ProviderId::OpenMeteo,
            period_start_time: 1_700_000_000,
            temp,
            min_temp: temp - 10.0,
            max_temp: temp + 10.0,
            humidity,
            min_humidity: humidity - 10.0,
            max_humidity: humidity + 10.0,
            wind_speed: 5.0,
            wind_height: 10.0,
            solar_radiation: 5.0,
            precip,
            raining: false,
        }
    }

    async fn run(options: &str, data: &WateringData) -> AdjustmentMethodResponse {
        let options = AdjustmentOptions::parse(options).expect("options");
        let coords = GeoCoordinates::new(40.0, -74.0).expect("valid");
        ZimmermanMethod
            .calculate_watering_scale(
                &options,
                std::slice::from_ref(data),
                coords,
                &MockWeatherProvider::new("m"),
                None,
            )
            .await
            .expect("zimmerman never fails")
    }

    #[tokio::test]
    async fn test_baseline_conditions_give_full_watering() {
        let response = run("", &window(70.0, 30.0, 0.0)).await;
        assert_eq!(response.scale, Some(100));
    }

    #[tokio::test]
    async fn test_factors_add_up() {
        // humidity 30-50 = -20, temperature (85-70)*4 = 60, precipitation -0.1*200 = -20
        let response = run("", &window(85.0, 50.0, 0.1)).await;
        assert_eq!(response.scale, Some(120));
        assert_eq!(
            response.raw_data,
            json!({ "wp": "OpenMeteo", "h": 50.0, "p": 0.1, "t": 85.0, "raining": 0 })
        );
    }

    #[tokio::test]
    async fn test_weights_and_bases_apply() {
        // humidity (40-50)*0.5 = -5, temperature (85-80)*4*2 = 40, precipitation -0.1*200*0 = 0
        let options = r#""bh":40,"bt":80,"h":50,"t":200,"r":0"#;
        let response = run(options, &window(85.0, 50.0, 0.1)).await;
        assert_eq!(response.scale, Some(135));
    }

    #[tokio::test]
    async fn test_scale_is_clamped() {
        assert_eq!(run("", &window(120.0, 5.0, 0.0)).await.scale, Some(200));
        assert_eq!(run("", &window(40.0, 100.0, 2.0)).await.scale, Some(0));
    }

    #[tokio::test]
    async fn test_scale_is_floored() {
        // 100 + (30 - 30.5) = 99.5
        assert_eq!(run("", &window(70.0, 30.5, 0.0)).await.scale, Some(99));
    }

    #[tokio::test]
    async fn test_raining_short_circuits_to_zero() {
        let mut data = window(100.0, 10.0, 0.0);
        data.raining = true;
        let response = run("", &data).await;
        assert_eq!(response.scale, Some(0));
        assert_eq!(response.raw_data, json!({ "raining": 1 }));
    }

    #[tokio::test]
    async fn test_missing_fields_leave_scale_unset() {
        for data in [
            window(f64::NAN, 30.0, 0.0),
            window(70.0, MISSING_SENTINEL, 0.0),
            window(70.0, 30.0, f64::INFINITY),
        ] {
            let response = run("", &data).await;
            assert_eq!(response.scale, None);
            assert!(response.error_message.is_some());
        }
    }

    #[tokio::test]
    async fn test_missing_reading_reported_as_null() {
        let response = run("", &window(70.0, MISSING_SENTINEL, 0.0)).await;
        assert_eq!(response.raw_data["h"], Value::Null);
        assert_eq!(response.raw_data["t"], 70.0);
    }

    #[tokio::test]
    async fn test_no_data_leaves_scale_unset() {
        let options = AdjustmentOptions::new();
        let coords = GeoCoordinates::new(40.0, -74.0).expect("valid");
        let response = ZimmermanMethod
            .calculate_watering_scale(&options, &[], coords, &MockWeatherProvider::new("m"), None)
            .await
            .expect("zimmerman never fails");
        assert_eq!(response.scale, None);
        assert!(response.error_message.is_some());
    }

    #[tokio::test]
    async fn test_history_produces_rolling_average_scales() {
        // Raw scales per day, most recent first: 120, 80, 160, 260
        let history = [
            window(85.0, 50.0, 0.1),
            window(65.0, 30.0, 0.0),
            window(85.0, 30.0, 0.0),
            window(110.0, 30.0, 0.0),
        ];
        let options = AdjustmentOptions::new();
        let coords = GeoCoordinates::new(40.0, -74.0).expect("valid");
        let response = ZimmermanMethod
            .calculate_watering_scale(&options, &history, coords, &MockWeatherProvider::new("m"), None)
            .await
            .expect("zimmerman never fails");

        // 120, (120+80)/2, (120+80+160)/3, (120+80+160+260)/4
        assert_eq!(response.scales, Some(vec![120, 100, 120, 155]));
        assert_eq!(response.scale, Some(120));
        assert_eq!(response.raw_data["t"], 85.0);
    }

    #[test]
    fn test_rolling_scales_stop_at_incomplete_day() {
        let history = [
            window(70.0, 30.0, 0.0),
            window(f64::NAN, 30.0, 0.0),
            window(90.0, 30.0, 0.0),
        ];
        let scales = rolling_scales(&AdjustmentOptions::new(), &history);
        assert_eq!(scales, vec![100]);
    }

    #[test]
    fn test_rolling_average_is_clamped_not_its_inputs() {
        // Raw 260 then -40: the average 110 is taken before clamping
        let history = [window(110.0, 30.0, 0.0), window(35.0, 30.0, 0.0)];
        let scales = rolling_scales(&AdjustmentOptions::new(), &history);
        assert_eq!(scales, vec![200, 110]);
    }

    fn zimmerman_scale(options: &AdjustmentOptions, data: &WateringData) -> i32 {
        clamp_scale(raw_scale(options, data))
    }

    #[test]
    fn test_scale_stays_in_range_for_extreme_inputs() {
        let options = AdjustmentOptions::parse(r#""h":500,"t":500,"r":500"#).expect("options");
        for temp in [-60.0, 0.0, 70.0, 140.0] {
            for humidity in [0.0, 50.0, 100.0] {
                for precip in [0.0, 0.5, 10.0] {
                    let scale = zimmerman_scale(&options, &window(temp, humidity, precip));
                    assert!((0..=200).contains(&scale), "scale {} out of range", scale);
                }
            }
        }
    }
}
