//! Reference evapotranspiration (FAO-56 Penman-Monteith)
//!
//! Converts one day of weather extrema into the reference crop
//! evapotranspiration in millimetres per day. The computation is pure; all
//! inputs come from an [`EToData`] sample plus the site elevation.

use chrono::{DateTime, Datelike};
use std::f64::consts::PI;
use thiserror::Error;

use crate::data::EToData;

/// Albedo of the hypothetical grass reference crop
const ALBEDO: f64 = 0.23;

/// Stefan-Boltzmann constant in MJ K⁻⁴ m⁻² day⁻¹
const STEFAN_BOLTZMANN: f64 = 4.903e-9;

/// Solar constant in MJ m⁻² min⁻¹
const SOLAR_CONSTANT: f64 = 0.082;

/// Lowest elevation accepted, in metres (Dead Sea shore is about -430 m)
const MIN_ELEVATION_M: f64 = -500.0;

/// Errors raised when a sample cannot produce a meaningful ETo
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EToError {
    /// An input was NaN or infinite
    #[error("ETo input '{0}' is not a finite number")]
    NonFinite(&'static str),

    /// A maximum was below its minimum
    #[error("ETo input range '{0}' has max below min")]
    InvertedRange(&'static str),

    /// Wind measured too close to the ground for the log-law adjustment
    #[error("Wind measurement height {0} m is too low to adjust to 2 m")]
    InvalidWindHeight(f64),

    #[error("Elevation {0} m is below the supported minimum")]
    InvalidElevation(f64),

    /// The period start could not be turned into a calendar day
    #[error("Invalid period start timestamp {0}")]
    InvalidTimestamp(i64),

    /// Clear-sky radiation is zero (polar night), so the cloudiness term is undefined
    #[error("No clear-sky radiation at latitude {0} on this day")]
    NoClearSkyRadiation(f64),
}

/// Calculates the reference evapotranspiration for one day
///
/// # Arguments
/// * `data` - Daily sample (°F, %, mph at `wind_height` metres, kWh/m²/day)
/// * `latitude` - Site latitude in degrees
/// * `elevation` - Site elevation in metres
///
/// # Returns
/// * `Ok(f64)` - ETo in mm/day
/// * `Err(EToError)` - If an input is invalid or the day has no clear-sky radiation
pub fn calculate_eto(data: &EToData, latitude: f64, elevation: f64) -> Result<f64, EToError> {
    validate(data, latitude, elevation)?;

    let min_temp = fahrenheit_to_celsius(data.min_temp);
    let max_temp = fahrenheit_to_celsius(data.max_temp);
    let avg_temp = (max_temp + min_temp) / 2.0;

    let wind_speed = standardize_wind_speed(mph_to_mps(data.wind_speed), data.wind_height);
    let solar_radiation = kwh_to_mj(data.solar_radiation);

    let vapor_slope = 4098.0 * saturation_vapor_pressure(avg_temp) / (avg_temp + 237.3).powi(2);
    let pressure = 101.3 * ((293.0 - 0.0065 * elevation) / 293.0).powf(5.26);
    let psychrometric = 0.000665 * pressure;

    let denominator = vapor_slope + psychrometric * (1.0 + 0.34 * wind_speed);
    let delta_term = vapor_slope / denominator;
    let psi_term = psychrometric / denominator;
    let temp_term = (900.0 / (avg_temp + 273.0)) * wind_speed;

    let min_saturation = saturation_vapor_pressure(min_temp);
    let max_saturation = saturation_vapor_pressure(max_temp);
    let avg_saturation = (min_saturation + max_saturation) / 2.0;
    let actual_vapor = (min_saturation * data.max_humidity / 100.0
        + max_saturation * data.min_humidity / 100.0)
        / 2.0;

    let day_of_year = day_of_year(data.period_start_time)?;
    let extraterrestrial = extraterrestrial_radiation(latitude, day_of_year);
    let clear_sky = (0.75 + 2e-5 * elevation) * extraterrestrial;
    if clear_sky <= f64::EPSILON {
        return Err(EToError::NoClearSkyRadiation(latitude));
    }

    let net_shortwave = (1.0 - ALBEDO) * solar_radiation;
    let net_longwave = STEFAN_BOLTZMANN
        * ((max_temp + 273.16).powi(4) + (min_temp + 273.16).powi(4))
        / 2.0
        * (0.34 - 0.14 * actual_vapor.sqrt())
        * (1.35 * solar_radiation / clear_sky - 0.35);
    let net_radiation = net_shortwave - net_longwave;

    let radiation_term = delta_term * 0.408 * net_radiation;
    let wind_term = psi_term * temp_term * (avg_saturation - actual_vapor);

    Ok(wind_term + radiation_term)
}

/// Adjusts a wind speed measured at `height` metres to the 2 m reference height
pub fn standardize_wind_speed(speed: f64, height: f64) -> f64 {
    speed * 4.87 / (67.8 * height - 5.42).ln()
}

fn validate(data: &EToData, latitude: f64, elevation: f64) -> Result<(), EToError> {
    let fields = [
        ("min_temp", data.min_temp),
        ("max_temp", data.max_temp),
        ("min_humidity", data.min_humidity),
        ("max_humidity", data.max_humidity),
        ("wind_speed", data.wind_speed),
        ("wind_height", data.wind_height),
        ("solar_radiation", data.solar_radiation),
        ("latitude", latitude),
        ("elevation", elevation),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(EToError::NonFinite(name));
        }
    }

    if data.max_temp < data.min_temp {
        return Err(EToError::InvertedRange("temperature"));
    }
    if data.max_humidity < data.min_humidity {
        return Err(EToError::InvertedRange("humidity"));
    }
    // ln(67.8 * h - 5.42) must be positive
    if data.wind_height <= 0.1 {
        return Err(EToError::InvalidWindHeight(data.wind_height));
    }
    if elevation < MIN_ELEVATION_M {
        return Err(EToError::InvalidElevation(elevation));
    }
    Ok(())
}

fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

fn mph_to_mps(mph: f64) -> f64 {
    mph * 0.44704
}

fn kwh_to_mj(kwh: f64) -> f64 {
    kwh * 3.6
}

/// Saturation vapour pressure in kPa at `temp` °C
fn saturation_vapor_pressure(temp: f64) -> f64 {
    0.6108 * (17.27 * temp / (temp + 237.3)).exp()
}

fn day_of_year(timestamp: i64) -> Result<f64, EToError> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| f64::from(dt.ordinal()))
        .ok_or(EToError::InvalidTimestamp(timestamp))
}

/// Extraterrestrial radiation in MJ/m²/day
fn extraterrestrial_radiation(latitude: f64, day_of_year: f64) -> f64 {
    let inverse_distance = 1.0 + 0.033 * (2.0 * PI / 365.0 * day_of_year).cos();
    let declination = 0.409 * (2.0 * PI / 365.0 * day_of_year - 1.39).sin();
    let latitude_rads = PI / 180.0 * latitude;

    // Clamped for polar day and polar night
    let sunset_hour_angle = (-latitude_rads.tan() * declination.tan())
        .clamp(-1.0, 1.0)
        .acos();

    24.0 * 60.0 / PI
        * SOLAR_CONSTANT
        * inverse_distance
        * (sunset_hour_angle * latitude_rads.sin() * declination.sin()
            + latitude_rads.cos() * declination.cos() * sunset_hour_angle.sin())
}
