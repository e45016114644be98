//! Numeric error codes reported to irrigation controllers
//!
//! Controller firmware only understands a small numeric code, so every failure
//! that leaves the service is reduced to an [`ErrorCode`]. Codes are grouped in
//! families: the tens digit names the family, the ones digit the specific fault.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Error codes understood by controller firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Included with every successful response
    NoError = 0,

    /// The scale could not be calculated from the weather information
    BadWeatherData = 1,
    /// Data for a full 24 hour period was not available
    InsufficientWeatherData = 10,
    /// A necessary field was missing from the weather data
    MissingWeatherField = 11,
    /// An HTTP or parsing error occurred while retrieving weather
    WeatherApiError = 12,

    /// The location could not be resolved
    LocationError = 2,
    /// An HTTP or parsing error occurred while resolving the location
    LocationServiceApiError = 20,
    /// No matches were found for the location name
    NoLocationFound = 21,
    /// The location was given in an invalid format
    InvalidLocationFormat = 22,

    /// A personal weather station problem
    PwsError = 3,
    /// The PWS ID did not use the correct format
    InvalidPwsId = 30,
    /// The PWS API key did not use the correct format
    InvalidPwsApiKey = 31,
    /// The PWS rejected the API key
    PwsAuthenticationError = 32,
    /// A PWS was given but the selected method cannot use one
    PwsNotSupported = 33,
    /// The provider needs a PWS but none was given
    NoPwsProvided = 34,

    /// An adjustment method or watering restriction problem
    AdjustmentMethodError = 4,
    /// The weather provider cannot serve the selected method
    UnsupportedAdjustmentMethod = 40,
    /// The method ID is unknown
    InvalidAdjustmentMethod = 41,

    /// An adjustment options problem
    AdjustmentOptionsError = 5,
    /// The options could not be parsed
    MalformedAdjustmentOptions = 50,
    /// A required option was not provided
    MissingAdjustmentOption = 51,

    /// An error that was never assigned a more specific code
    UnexpectedError = 99,
}

impl ErrorCode {
    /// Numeric value sent to the controller
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the family code (the single-digit parent) for this code
    ///
    /// `NoError` and `UnexpectedError` are their own family.
    pub fn family(self) -> ErrorCode {
        match self.as_u8() {
            0 => ErrorCode::NoError,
            1 | 10..=19 => ErrorCode::BadWeatherData,
            2 | 20..=29 => ErrorCode::LocationError,
            3 | 30..=39 => ErrorCode::PwsError,
            4 | 40..=49 => ErrorCode::AdjustmentMethodError,
            5 | 50..=59 => ErrorCode::AdjustmentOptionsError,
            _ => ErrorCode::UnexpectedError,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

/// An error carrying a firmware error code
///
/// Messages must never contain secrets such as PWS keys; they may be shown to
/// end users.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message} (errCode {code:?})")]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
}

impl CodedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates an error with no user-facing message
    pub fn bare(code: ErrorCode) -> Self {
        Self {
            code,
            message: String::new(),
        }
    }

    pub fn unexpected() -> Self {
        Self::bare(ErrorCode::UnexpectedError)
    }
}

/// Reduces an arbitrary error to a [`CodedError`]
///
/// Coded errors pass through untouched. Anything else is logged and replaced by
/// a bare `UnexpectedError`, so internal details never reach the response.
pub fn make_coded_error(err: anyhow::Error) -> CodedError {
    match err.downcast::<CodedError>() {
        Ok(coded) => coded,
        Err(other) => {
            tracing::error!(error = %other, "unhandled error reduced to UnexpectedError");
            CodedError::unexpected()
        }
    }
}

impl From<crate::eto::EToError> for CodedError {
    fn from(err: crate::eto::EToError) -> Self {
        CodedError::new(ErrorCode::BadWeatherData, err.to_string())
    }
}
