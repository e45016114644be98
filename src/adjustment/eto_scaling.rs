//! ETo scaling method
//!
//! Scales watering by how the last day's potential evapotranspiration, less
//! rainfall, compares to the baseline ETo the program was designed for.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{
    clamp_scale, round_to, AdjustmentMethod, AdjustmentMethodId, AdjustmentMethodResponse,
    WateringDataNeed,
};
use crate::baseline::BaselineEToLookup;
use crate::data::{is_present, AdjustmentOptions, GeoCoordinates, Pws, WateringData};
use crate::error::CodedError;
use crate::eto::calculate_eto;
use crate::providers::WeatherProvider;

/// Baseline used when neither the options nor the raster supply one, in mm/day
///
/// Not derived from any location; sites should set `baseETo` instead.
pub const DEFAULT_BASE_ETO_MM: f64 = 2.0;

/// Site elevation assumed when no `elevation` option is given, in metres
pub const DEFAULT_ELEVATION_M: f64 = 150.0;

const MM_PER_INCH: f64 = 25.4;

pub struct EToScalingMethod {
    baseline: Option<Arc<BaselineEToLookup>>,
    default_elevation: f64,
}

impl Default for EToScalingMethod {
    fn default() -> Self {
        Self::new(None, DEFAULT_ELEVATION_M)
    }
}

impl EToScalingMethod {
    pub fn new(baseline: Option<Arc<BaselineEToLookup>>, default_elevation: f64) -> Self {
        Self {
            baseline,
            default_elevation,
        }
    }

    /// Resolves the baseline ETo in mm/day
    ///
    /// Order: the `baseETo` option, the baseline raster, then
    /// [`DEFAULT_BASE_ETO_MM`].
    async fn base_eto(&self, options: &AdjustmentOptions, coordinates: GeoCoordinates) -> f64 {
        if let Some(base) = options.number("baseETo").filter(|b| *b > 0.0) {
            return base;
        }

        if let Some(baseline) = self.baseline.as_ref().filter(|b| b.is_available()) {
            match baseline.average_daily_eto(coordinates).await {
                Ok(inches) if inches > 0.0 => return inches * MM_PER_INCH,
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(%coordinates, error = %err, "no baseline ETo, using default");
                }
            }
        }

        DEFAULT_BASE_ETO_MM
    }
}

#[async_trait]
impl AdjustmentMethod for EToScalingMethod {
    fn id(&self) -> AdjustmentMethodId {
        AdjustmentMethodId::EToScaling
    }

    fn watering_data_need(&self) -> WateringDataNeed {
        WateringDataNeed::Optional
    }

    async fn calculate_watering_scale(
        &self,
        options: &AdjustmentOptions,
        watering_data: &[WateringData],
        coordinates: GeoCoordinates,
        provider: &dyn WeatherProvider,
        pws: Option<&Pws>,
    ) -> Result<AdjustmentMethodResponse, CodedError> {
        if !provider.capabilities().eto_data {
            return Ok(AdjustmentMethodResponse {
                error_message: Some(format!(
                    "ETo adjustment is not supported by the {} weather provider",
                    provider.name()
                )),
                ..AdjustmentMethodResponse::unset(json!({}))
            });
        }

        if let Some(latest) = watering_data.first().filter(|data| data.raining) {
            return Ok(AdjustmentMethodResponse {
                scale: Some(0),
                watering_data: Some(latest.clone()),
                ..AdjustmentMethodResponse::unset(json!({ "raining": 1 }))
            });
        }

        let Some(data) = provider.eto_data(coordinates, pws).await? else {
            return Ok(AdjustmentMethodResponse {
                error_message: Some("No ETo data available for this location".to_string()),
                ..AdjustmentMethodResponse::unset(json!({}))
            });
        };

        if data.raining {
            return Ok(AdjustmentMethodResponse {
                scale: Some(0),
                watering_data: Some(data),
                ..AdjustmentMethodResponse::unset(json!({ "raining": 1 }))
            });
        }

        let elevation = options.number_or("elevation", self.default_elevation);
        let base_eto = self.base_eto(options, coordinates).await;
        let eto = calculate_eto(&data, coordinates.latitude(), elevation)?;

        let precip_in = if is_present(data.precip) {
            data.precip
        } else {
            tracing::warn!(%coordinates, "ETo data has no precipitation, assuming none");
            0.0
        };
        let scale = clamp_scale((eto - precip_in * MM_PER_INCH) / base_eto * 100.0);

        Ok(AdjustmentMethodResponse {
            scale: Some(scale),
            raw_data: json!({
                "baseETo": round_to(base_eto, 3),
                "eto": round_to(eto, 3),
                "radiation": round_to(data.solar_radiation, 2),
                "minT": data.min_temp.round() as i64,
                "maxT": data.max_temp.round() as i64,
                "minH": data.min_humidity.round() as i64,
                "maxH": data.max_humidity.round() as i64,
                "wind": round_to(data.wind_speed, 1),
                "p": round_to(precip_in, 2),
            }),
            error_message: None,
            rain_delay: None,
            scales: None,
            watering_data: Some(data),
        })
    }
}
