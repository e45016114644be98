//! wateringscale - irrigation watering scales from recent weather
//!
//! Reads settings, builds the weather provider chain and runs one command,
//! printing its result as JSON on stdout. Logs go to stderr.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wateringscale::cli::{params_map, Cli, Command};
use wateringscale::config::Settings;
use wateringscale::error::{make_coded_error, CodedError, ErrorCode};

/// Error body printed for commands other than `scale`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    err_code: ErrorCode,
    #[serde(skip_serializing_if = "String::is_empty")]
    message: String,
}

impl From<CodedError> for ErrorBody {
    fn from(err: CodedError) -> Self {
        Self {
            err_code: err.code,
            message: err.message,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints a coded failure and maps it to a non-zero exit status
fn report(err: CodedError) -> anyhow::Result<ExitCode> {
    print_json(&ErrorBody::from(err))?;
    Ok(ExitCode::FAILURE)
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load configuration")?;
    if !cli.provider.is_empty() {
        settings.providers = cli.provider.clone();
    }
    tracing::debug!(?settings, "loaded configuration");

    match cli.command {
        Command::Scale(args) => {
            let request = match args.to_request() {
                Ok(request) => request,
                Err(err) => return report(err.into()),
            };
            let service = settings.build_service().await;
            let result = service.calculate(&request).await;
            print_json(&result)?;
            Ok(if result.is_error() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Baseline { location } => {
            let service = settings.build_service().await;
            match service.baseline_eto(&location).await {
                Ok(eto) => {
                    print_json(&serde_json::json!({ "eto": eto }))?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => report(err),
            }
        }
        Command::Weather { location } => {
            let service = settings.build_service().await;
            match service.weather(&location).await {
                Ok(Some(weather)) => {
                    print_json(&weather)?;
                    Ok(ExitCode::SUCCESS)
                }
                Ok(None) => report(CodedError::new(
                    ErrorCode::InsufficientWeatherData,
                    "No provider had weather data for this location",
                )),
                Err(err) => report(err),
            }
        }
        Command::Ingest { params } => {
            let provider = settings.local_provider();
            let observation = provider.ingest(&params_map(&params));
            provider.save().context("failed to save observations")?;
            print_json(&serde_json::json!({
                "observation": observation,
                "buffered": provider.observation_count(),
            }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wateringscale=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            let coded = make_coded_error(err);
            match report(coded) {
                Ok(code) => code,
                Err(_) => ExitCode::FAILURE,
            }
        }
    }
}
