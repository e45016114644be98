//! Command-line interface parsing
//!
//! Each subcommand maps onto one service operation and prints JSON to stdout.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::adjustment::RESTRICTION_BIT;
use crate::config::ProviderKind;
use crate::error::{CodedError, ErrorCode};
use crate::service::{PwsCredentials, ScaleRequest};

/// Error types for CLI argument handling
#[derive(Debug, Error, PartialEq)]
pub enum CliError {
    /// An upload parameter was not written as `key=value`
    #[error("Invalid parameter '{0}': expected key=value")]
    InvalidParam(String),

    #[error("--pws-id requires --pws-key")]
    MissingPwsKey,
}

impl From<CliError> for CodedError {
    fn from(err: CliError) -> Self {
        let code = match err {
            CliError::InvalidParam(_) => ErrorCode::MalformedAdjustmentOptions,
            CliError::MissingPwsKey => ErrorCode::InvalidPwsApiKey,
        };
        CodedError::new(code, err.to_string())
    }
}

/// Compute irrigation watering scales from recent weather
#[derive(Parser, Debug)]
#[command(name = "wateringscale")]
#[command(about = "Irrigation watering scales from recent weather")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "WATERINGSCALE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Weather providers to try in order, overriding the configuration
    #[arg(long, global = true, value_enum, value_delimiter = ',')]
    pub provider: Vec<ProviderKind>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Calculate the watering scale for a site
    Scale(ScaleArgs),

    /// Look up the baseline daily ETo (inches/day) for a site
    Baseline {
        /// `lat,lon` or a place name
        location: String,
    },

    /// Show current conditions and forecast for a site
    Weather {
        /// `lat,lon` or a place name
        location: String,
    },

    /// Record one upload from a local weather station
    ///
    /// Example: wateringscale ingest tempf=71.2 humidity=48 dailyrainin=0.02
    Ingest {
        /// Upload fields as key=value
        #[arg(required = true, value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

#[derive(Args, Debug)]
pub struct ScaleArgs {
    /// Adjustment method: 0 manual, 1 Zimmerman, 2 rain delay, 3 ETo
    #[arg(short, long, default_value_t = 1)]
    pub method: u8,

    /// `lat,lon` or a place name
    #[arg(short, long)]
    pub location: String,

    /// Adjustment options as JSON, braces optional (e.g. '"h":100,"t":100')
    #[arg(short, long, default_value = "")]
    pub options: String,

    /// Stop watering when the last day had more than 0.1" of rain
    #[arg(long)]
    pub restrict: bool,

    #[arg(long, value_name = "ID")]
    pub pws_id: Option<String>,

    #[arg(long, value_name = "KEY")]
    pub pws_key: Option<String>,
}

impl ScaleArgs {
    /// Builds the service request, folding `--restrict` into the method byte
    ///
    /// # Returns
    /// * `Err(CliError::MissingPwsKey)` if a station ID is given without a key
    pub fn to_request(&self) -> Result<ScaleRequest, CliError> {
        let pws = match (&self.pws_id, &self.pws_key) {
            (_, Some(key)) => Some(PwsCredentials {
                id: self.pws_id.clone(),
                key: key.clone(),
            }),
            (Some(_), None) => return Err(CliError::MissingPwsKey),
            (None, None) => None,
        };

        let method = if self.restrict {
            self.method | RESTRICTION_BIT
        } else {
            self.method
        };

        Ok(ScaleRequest {
            method,
            location: self.location.clone(),
            options: self.options.clone(),
            pws,
        })
    }
}

/// Parses one `key=value` upload field
pub fn parse_param(s: &str) -> Result<(String, String), CliError> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(CliError::InvalidParam(s.to_string())),
    }
}

/// Collects upload fields into the map the station provider ingests
pub fn params_map(params: &[(String, String)]) -> HashMap<String, String> {
    params.iter().cloned().collect()
}
