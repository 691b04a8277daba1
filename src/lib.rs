//! # Sensorflux
//!
//! Flux query compilation and result decoding for sensor time-series.
//!
//! ## Features
//!
//! - **Declarative queries**: validated specifications with relative, absolute and `now()` ranges
//! - **Deterministic scripts**: a fixed Flux pipeline per specification
//! - **Typed results**: nullable samples decoded from the store's row stream
//! - **Injected sessions**: no global client, any [`StoreClient`] can be plugged in
//!
//! ## Modules
//!
//! - [`query`]: time expressions, specification, compiler and decoder
//! - [`store`]: store session seam and annotated CSV rows
//! - [`service`]: end-to-end query execution with timeouts
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sensorflux::query::{AggregateFn, QuerySpec};
//! use sensorflux::store::ReplayClient;
//! use sensorflux::{QueryService, StoreConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(ReplayClient::from_path("result.csv")?);
//!     let service = QueryService::new(client, &StoreConfig::default())?;
//!
//!     let spec = QuerySpec::builder("sensors", "temp")
//!         .filter("sensor_mac", "AA:BB")
//!         .aggregate("5m", AggregateFn::Mean)
//!         .range("-1h", "now()")
//!         .build();
//!
//!     let samples = service.run(&spec).await?;
//!     println!("Found {} samples", samples.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod query;
pub mod service;
pub mod store;

pub use query::{
    compile, decode, AggregateFn, FluxQuery, QueryError, QueryResult, QuerySpec, Sample,
    SensorQueryRequest,
};

pub use store::{AnnotatedCsvRows, Record, ReplayClient, StoreClient, StoreError, StoreResult};

pub use service::{QueryService, ServiceError, ServiceResult};

pub use config::{
    generate_default_config, Config, ConfigError, LoadReport, LoggingConfig, StoreConfig,
};
