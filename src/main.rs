//! Sensorflux CLI
//!
//! Command-line interface for sensor queries:
//! - Validate and compile query specifications to Flux
//! - Map dashboard sensor requests onto queries
//! - Decode saved annotated CSV results
//! - Replay a saved result through the full query path

use anyhow::{bail, Context};
use chrono::{FixedOffset, Local};
use clap::{Parser, Subcommand};
use sensorflux::query::{compile, decode_with, DecodeOptions, QuerySpec, SensorQueryRequest};
use sensorflux::{
    generate_default_config, AnnotatedCsvRows, Config, LoadReport, LoggingConfig, QueryService,
    ReplayClient,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sensorflux")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Flux query compiler and result decoder for sensor time-series")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: searched in the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a query specification and print its Flux script
    Compile {
        /// JSON specification file (default: stdin)
        input: Option<PathBuf>,
        /// Render without validating
        #[arg(long)]
        no_validate: bool,
    },

    /// Validate a query specification
    Validate {
        /// JSON specification file (default: stdin)
        input: Option<PathBuf>,
    },

    /// Map a sensor request to a query and print its Flux script
    Request {
        /// JSON request file (default: stdin)
        input: Option<PathBuf>,
        /// Bucket to query (default: store.bucket from config)
        #[arg(short, long)]
        bucket: Option<String>,
        /// UTC offset of the request times in seconds (default: local time zone)
        #[arg(long, allow_hyphen_values = true)]
        utc_offset: Option<i32>,
        /// Require all four sensor filters
        #[arg(long)]
        single_series: bool,
    },

    /// Decode a saved annotated CSV result into JSON samples
    Decode {
        /// Result file
        path: PathBuf,
        /// Column holding the measured value
        #[arg(long, default_value = sensorflux::query::VALUE_COLUMN)]
        value_column: String,
        /// Tag column copied into each sample
        #[arg(long, default_value = sensorflux::query::TAG_COLUMN)]
        tag_column: String,
    },

    /// Run a query against a saved result
    Replay {
        /// JSON specification file, or sensor request with --request
        input: PathBuf,
        /// Annotated CSV result answering the query
        #[arg(short, long)]
        result: PathBuf,
        /// Read the input as a sensor request
        #[arg(long)]
        request: bool,
    },

    /// Generate default config file, or check the effective one
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Validate the store settings of the loaded config
        #[arg(long)]
        check: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, report) = match &cli.config {
        Some(path) => {
            let config = Config::load_with_env(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            let report = LoadReport {
                source: Some(path.clone()),
                ..LoadReport::default()
            };
            (config, report)
        }
        None => Config::load_default(),
    };
    init_logging(&config.logging);
    report.log();

    match cli.command {
        Commands::Compile { input, no_validate } => {
            let spec: QuerySpec = read_json(input.as_deref())?;
            if !no_validate {
                spec.validate().context("invalid query")?;
            }
            println!("{}", compile(&spec));
        }

        Commands::Validate { input } => {
            let spec: QuerySpec = read_json(input.as_deref())?;
            spec.validate().context("invalid query")?;
            println!("valid");
        }

        Commands::Request {
            input,
            bucket,
            utc_offset,
            single_series,
        } => {
            let request: SensorQueryRequest = read_json(input.as_deref())?;
            if single_series {
                request.filter.require_complete().context("incomplete sensor filter")?;
            }

            let bucket = bucket.unwrap_or_else(|| config.store.bucket.clone());
            let spec = match utc_offset {
                Some(seconds) => {
                    let Some(tz) = FixedOffset::east_opt(seconds) else {
                        bail!("UTC offset out of range: {}", seconds);
                    };
                    request.to_spec(&bucket, &tz)?
                }
                None => request.to_spec(&bucket, &Local)?,
            };

            spec.validate().context("invalid query")?;
            println!("{}", compile(&spec));
        }

        Commands::Decode {
            path,
            value_column,
            tag_column,
        } => {
            let rows = AnnotatedCsvRows::from_path(&path)
                .with_context(|| format!("opening {}", path.display()))?;
            let options = DecodeOptions::default()
                .value_column(value_column)
                .tag_column(tag_column);

            let samples = decode_with(rows, &options)?;
            tracing::info!("Decoded {} samples", samples.len());
            println!("{}", serde_json::to_string_pretty(&samples)?);
        }

        Commands::Replay {
            input,
            result,
            request,
        } => {
            let client = ReplayClient::from_path(&result)
                .with_context(|| format!("opening {}", result.display()))?;
            let service = QueryService::new(Arc::new(client), &config.store)?;

            let samples = if request {
                let request: SensorQueryRequest = read_json(Some(input.as_path()))?;
                service.run_request(&request).await?
            } else {
                let spec: QuerySpec = read_json(Some(input.as_path()))?;
                service.run(&spec).await?
            };
            println!("{}", serde_json::to_string_pretty(&samples)?);
        }

        Commands::Config { output, check } => {
            if check {
                config.store.validate()?;
                println!("Configuration OK");
                return Ok(());
            }

            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

/// Install the global subscriber; logs go to stderr so stdout stays parseable
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sensorflux={}", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(input: Option<&Path>) -> anyhow::Result<T> {
    let text = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading stdin")?;
            text
        }
    };
    serde_json::from_str(&text).context("parsing JSON input")
}
