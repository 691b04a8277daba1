//! Sensorflux Query Core
//!
//! Turns a declarative query into a Flux script and the store's result rows
//! back into typed samples:
//!
//! - **Time**: parse `now()`, duration and UTC timestamp expressions
//! - **Spec**: query specification types and validation
//! - **Compiler**: render a specification as a Flux pipeline
//! - **Decoder**: decode result rows into [`Sample`]s
//! - **Request**: map dashboard sensor requests onto specifications
//!
//! # Pipeline
//!
//! ```text
//! QuerySpec → validate → compile → (store) → rows → decode → Vec<Sample>
//! ```
//!
//! # Example
//!
//! ```rust
//! use sensorflux::query::{compile, AggregateFn, QuerySpec};
//!
//! let spec = QuerySpec::builder("sensors", "temp")
//!     .filter("sensor_mac", "AA:BB")
//!     .aggregate("5m", AggregateFn::Mean)
//!     .range("-1h", "now()")
//!     .build();
//!
//! spec.validate().unwrap();
//! let script = compile(&spec);
//! assert_eq!(script.lines().count(), 8);
//! ```

mod compiler;
mod decoder;
mod error;
mod request;
mod spec;
mod time;

pub use compiler::{
    aggregate_stage, compile, compile_stages, field_stage, group_stage, measurement_stage,
    projection_stage, range_stage, source_stage, tag_filter_stage, FluxQuery, GROUP_COLUMNS,
    KEPT_COLUMNS,
};
pub use decoder::{
    decode, decode_row, decode_with, DecodeOptions, Row, Sample, Value, TAG_COLUMN, VALUE_COLUMN,
};
pub use error::{QueryError, QueryResult};
pub use request::{SensorFilter, SensorQueryRequest, REQUEST_LAYOUT, SENSOR_FIELD};
pub use spec::{Aggregate, AggregateFn, KeyValue, QuerySpec, QuerySpecBuilder, Range};
pub use time::{
    format_utc, parse_duration, parse_utc_timestamp, positive_duration, resolve, window_duration,
    TimeExpr, NOW_LITERAL, UTC_LAYOUT,
};
