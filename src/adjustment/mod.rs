//! Watering adjustment methods
//!
//! Each method turns recent weather into a watering scale, a percentage the
//! controller applies to its programmed run times. Methods are stateless; the
//! service decides which weather data to fetch based on
//! [`AdjustmentMethod::watering_data_need`].

mod eto_scaling;
mod manual;
mod rain_delay;
mod zimmerman;

pub use eto_scaling::{EToScalingMethod, DEFAULT_BASE_ETO_MM, DEFAULT_ELEVATION_M};
pub use manual::ManualMethod;
pub use rain_delay::RainDelayMethod;
pub use zimmerman::ZimmermanMethod;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::data::{AdjustmentOptions, GeoCoordinates, Pws, WateringData};
use crate::error::{CodedError, ErrorCode};
use crate::providers::WeatherProvider;

/// High bit of the method byte, set when restrictions must be checked
pub const RESTRICTION_BIT: u8 = 1 << 7;

/// Scale telling the controller to keep its manual run times
pub const MANUAL_SCALE: i32 = -1;

pub const MIN_SCALE: f64 = 0.0;
pub const MAX_SCALE: f64 = 200.0;

/// Method IDs as sent by controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AdjustmentMethodId {
    Manual = 0,
    Zimmerman = 1,
    RainDelay = 2,
    EToScaling = 3,
}

impl AdjustmentMethodId {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Splits the raw method byte into the method and the restriction flag
    ///
    /// # Returns
    /// * `Err(CodedError)` with `InvalidAdjustmentMethod` for unknown IDs
    pub fn decode(raw: u8) -> Result<(Self, bool), CodedError> {
        let restricted = raw & RESTRICTION_BIT != 0;
        let method = match raw & !RESTRICTION_BIT {
            0 => Self::Manual,
            1 => Self::Zimmerman,
            2 => Self::RainDelay,
            3 => Self::EToScaling,
            other => {
                return Err(CodedError::new(
                    ErrorCode::InvalidAdjustmentMethod,
                    format!("Unknown adjustment method {}", other),
                ))
            }
        };
        Ok((method, restricted))
    }
}

/// How much a method depends on watering data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WateringDataNeed {
    /// Never looks at watering data
    None,
    /// Uses it when available; a failed fetch is not fatal
    Optional,
    /// A failed fetch fails the calculation
    Required,
}

/// Outcome of one scale calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentMethodResponse {
    /// Percentage in 0..=200, [`MANUAL_SCALE`], or `None` to leave watering unchanged
    pub scale: Option<i32>,
    /// Rounded diagnostics forwarded to the controller
    pub raw_data: Value,
    /// Set when the scale defaulted or was computed from incomplete data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Hours to delay watering because of rain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rain_delay: Option<u32>,
    /// Per-day scales over the available history, most recent first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scales: Option<Vec<i32>>,
    #[serde(skip)]
    pub watering_data: Option<WateringData>,
}

impl AdjustmentMethodResponse {
    pub fn unset(raw_data: Value) -> Self {
        Self {
            scale: None,
            raw_data,
            error_message: None,
            rain_delay: None,
            scales: None,
            watering_data: None,
        }
    }
}

/// A strategy for turning weather into a watering scale
#[async_trait]
pub trait AdjustmentMethod: Send + Sync {
    fn id(&self) -> AdjustmentMethodId;

    fn watering_data_need(&self) -> WateringDataNeed;

    /// Calculates the scale for one request
    ///
    /// `watering_data` holds the daily windows, most recent first. It is
    /// empty when the data was not needed or could not be fetched; methods
    /// degrade to an unset scale instead of failing then.
    async fn calculate_watering_scale(
        &self,
        options: &AdjustmentOptions,
        watering_data: &[WateringData],
        coordinates: GeoCoordinates,
        provider: &dyn WeatherProvider,
        pws: Option<&Pws>,
    ) -> Result<AdjustmentMethodResponse, CodedError>;
}

/// Clamps a raw percentage to the valid scale range and floors it
pub fn clamp_scale(value: f64) -> i32 {
    value.clamp(MIN_SCALE, MAX_SCALE).floor() as i32
}

/// Rounds to a fixed number of decimal places for diagnostics
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
