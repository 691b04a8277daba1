//! Result Decoder
//!
//! Materializes the store's row stream into typed [`Sample`]s.
//!
//! # Value Policy
//!
//! | cell            | sample value      |
//! |-----------------|-------------------|
//! | 32-bit float    | widened to `f64`  |
//! | 64-bit float    | passed through    |
//! | absent          | `None`            |
//! | anything else   | decode error      |
//!
//! Decoding is all-or-nothing: the first bad cell or upstream error discards
//! every sample accumulated so far.

use crate::query::error::{QueryError, QueryResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Default column holding the measured value
pub const VALUE_COLUMN: &str = "_value";

/// Default tag column copied into each sample
pub const TAG_COLUMN: &str = "sensor_type";

/// A dynamically typed result cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float32(f32),
    Float64(f64),
    Int64(i64),
    UInt64(u64),
    Bool(bool),
    String(String),
    Time(DateTime<Utc>),
}

impl Value {
    /// Short name of the scalar type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::Int64(_) => "int64",
            Self::UInt64(_) => "uint64",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Time(_) => "time",
        }
    }
}

/// A single row delivered by the store
pub trait Row {
    /// Timestamp of the row
    fn time(&self) -> DateTime<Utc>;

    /// Look up a column; `None` means the cell is absent
    fn value_by_key(&self, key: &str) -> Option<&Value>;
}

/// One decoded result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Row timestamp
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    /// Measured value, absent when the store returned no value
    pub value: Option<f64>,
    /// Value of the tag column of interest
    #[serde(rename = "field_tag")]
    pub tag: String,
}

/// Which columns the decoder reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Column holding the measured value
    pub value_column: String,
    /// Tag column copied into [`Sample::tag`]
    pub tag_column: String,
}

impl DecodeOptions {
    /// Builder method: set the tag column
    pub fn tag_column(mut self, column: impl Into<String>) -> Self {
        self.tag_column = column.into();
        self
    }

    /// Builder method: set the value column
    pub fn value_column(mut self, column: impl Into<String>) -> Self {
        self.value_column = column.into();
        self
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            value_column: VALUE_COLUMN.to_string(),
            tag_column: TAG_COLUMN.to_string(),
        }
    }
}

/// Decode rows using the default columns
pub fn decode<I, R, E>(rows: I) -> QueryResult<Vec<Sample>>
where
    I: IntoIterator<Item = Result<R, E>>,
    R: Row,
    E: Display,
{
    decode_with(rows, &DecodeOptions::default())
}

/// Decode rows, reading the columns named in `options`
///
/// Rows are returned in delivery order. An empty stream yields an empty
/// vector.
pub fn decode_with<I, R, E>(rows: I, options: &DecodeOptions) -> QueryResult<Vec<Sample>>
where
    I: IntoIterator<Item = Result<R, E>>,
    R: Row,
    E: Display,
{
    let mut samples = Vec::new();

    for row in rows {
        let row = row.map_err(|e| QueryError::UpstreamIteration(e.to_string()))?;
        samples.push(decode_row(&row, options)?);
    }

    Ok(samples)
}

/// Decode a single row
pub fn decode_row<R: Row>(row: &R, options: &DecodeOptions) -> QueryResult<Sample> {
    let tag = match row.value_by_key(&options.tag_column) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(QueryError::UnsupportedValueType {
                column: options.tag_column.clone(),
                found: other.type_name().to_string(),
            })
        }
        None => String::new(),
    };

    let value = match row.value_by_key(&options.value_column) {
        Some(Value::Float32(v)) => Some(f64::from(*v)),
        Some(Value::Float64(v)) => Some(*v),
        None => None,
        Some(other) => {
            return Err(QueryError::UnsupportedValueType {
                column: options.value_column.clone(),
                found: other.type_name().to_string(),
            })
        }
    };

    Ok(Sample {
        timestamp: row.time(),
        value,
        tag,
    })
}
