//! Query Specification
//!
//! Typed representation of a declarative time-series query and the
//! structural invariants it must satisfy before it can be compiled.
//!
//! # Example
//!
//! ```rust
//! use sensorflux::query::{AggregateFn, QuerySpec};
//!
//! let spec = QuerySpec::builder("sensors", "temp")
//!     .filter("sensor_mac", "AA:BB")
//!     .aggregate("5m", AggregateFn::Mean)
//!     .range("-1h", "now()")
//!     .build();
//!
//! assert!(spec.validate().is_ok());
//! ```

use crate::query::error::{QueryError, QueryResult};
use crate::query::time::{resolve, window_duration, NOW_LITERAL};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Equality filter on a tag column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Tag name
    pub key: String,
    /// Tag value
    pub value: String,
}

impl KeyValue {
    /// Create a new filter
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Reducers accepted by the aggregate stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    /// Arithmetic mean of the window
    Mean,
    /// Median of the window
    Median,
}

impl AggregateFn {
    /// Name as written in the script
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
        }
    }
}

impl FromStr for AggregateFn {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            other => Err(QueryError::InvalidAggregateFunction(other.to_string())),
        }
    }
}

impl std::fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Windowed aggregation settings
///
/// `func` is kept as the caller supplied it so that an unsupported reducer
/// is reported by validation rather than lost during deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Aggregate {
    /// Whether the aggregate stage is emitted at all
    #[serde(rename = "enable", alias = "enabled", default)]
    pub enabled: bool,
    /// Window width, a duration literal
    #[serde(default)]
    pub every: String,
    /// Reducer name
    #[serde(rename = "fn", default)]
    pub func: String,
    /// Materialize windows that contain no rows
    #[serde(default)]
    pub create_empty: bool,
}

impl Aggregate {
    /// An enabled aggregate with the given window and reducer
    pub fn every(every: impl Into<String>, func: AggregateFn) -> Self {
        Self {
            enabled: true,
            every: every.into(),
            func: func.to_string(),
            create_empty: false,
        }
    }

    /// Builder method: materialize empty windows
    pub fn create_empty(mut self, create_empty: bool) -> Self {
        self.create_empty = create_empty;
        self
    }

    /// The typed reducer, if `func` names a supported one
    pub fn reducer(&self) -> QueryResult<AggregateFn> {
        self.func.parse()
    }

    /// Check the reducer, then the window width; disabled aggregates always pass
    pub fn validate(&self) -> QueryResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.reducer()?;
        window_duration(&self.every)?;
        Ok(())
    }
}

/// Query time range, both bounds kept as literal expressions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// Inclusive lower bound
    pub start: String,
    /// Exclusive upper bound
    pub stop: String,
}

impl Range {
    /// Create a new range
    pub fn new(start: impl Into<String>, stop: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            stop: stop.into(),
        }
    }

    /// A range from `start` up to `now()`
    pub fn since(start: impl Into<String>) -> Self {
        Self::new(start, NOW_LITERAL)
    }

    /// Resolve both bounds against a single `now` and check their order
    pub fn validate_at(&self, now: DateTime<Utc>) -> QueryResult<(DateTime<Utc>, DateTime<Utc>)> {
        if self.start.is_empty() {
            return Err(QueryError::InvalidRange("start could not be empty".to_string()));
        }
        if self.stop.is_empty() {
            return Err(QueryError::InvalidRange("stop could not be empty".to_string()));
        }

        let start = resolve(&self.start, now)?;
        let stop = resolve(&self.stop, now)?;

        if start >= stop {
            return Err(QueryError::InvalidRange(format!(
                "start {} should be before stop {}",
                self.start, self.stop
            )));
        }
        Ok((start, stop))
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::since("-1h")
    }
}

/// A complete query request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Storage partition to read from
    pub bucket: String,
    /// Series name inside the bucket
    pub measurement: String,
    /// Field columns to select, OR-combined
    pub fields: Vec<String>,
    /// Tag equality filters, AND-combined
    #[serde(default)]
    pub filters: Vec<KeyValue>,
    /// Optional windowed aggregation
    #[serde(default)]
    pub aggregate: Aggregate,
    /// Time range
    pub range: Range,
}

impl QuerySpec {
    /// Start building a specification
    pub fn builder(bucket: impl Into<String>, measurement: impl Into<String>) -> QuerySpecBuilder {
        QuerySpecBuilder::new(bucket, measurement)
    }

    /// Validate against the current time
    pub fn validate(&self) -> QueryResult<()> {
        self.validate_at(Utc::now())
    }

    /// Validate against a fixed `now`; the first violation found is returned
    pub fn validate_at(&self, now: DateTime<Utc>) -> QueryResult<()> {
        if self.bucket.is_empty() {
            return Err(QueryError::EmptyRequiredField("bucket".to_string()));
        }
        if self.measurement.is_empty() {
            return Err(QueryError::EmptyRequiredField("measurement".to_string()));
        }
        if self.fields.is_empty() {
            return Err(QueryError::EmptyRequiredField("fields".to_string()));
        }
        for filter in &self.filters {
            if filter.key.is_empty() || filter.value.is_empty() {
                return Err(QueryError::EmptyRequiredField(format!(
                    "filter key(value) {:?}={:?}",
                    filter.key, filter.value
                )));
            }
        }

        self.aggregate.validate()?;
        self.range.validate_at(now)?;
        Ok(())
    }
}

/// Builder for constructing specifications programmatically
#[derive(Debug, Clone)]
pub struct QuerySpecBuilder {
    bucket: String,
    measurement: String,
    fields: Vec<String>,
    filters: Vec<KeyValue>,
    aggregate: Aggregate,
    range: Range,
}

impl QuerySpecBuilder {
    /// Create a builder selecting the `value` field over the last hour
    pub fn new(bucket: impl Into<String>, measurement: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            measurement: measurement.into(),
            fields: Vec::new(),
            filters: Vec::new(),
            aggregate: Aggregate::default(),
            range: Range::default(),
        }
    }

    /// Add a field to select
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Add a tag equality filter
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(KeyValue::new(key, value));
        self
    }

    /// Enable windowed aggregation
    pub fn aggregate(mut self, every: impl Into<String>, func: AggregateFn) -> Self {
        self.aggregate = Aggregate::every(every, func);
        self
    }

    /// Replace the aggregate settings wholesale
    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// Set the time range
    pub fn range(mut self, start: impl Into<String>, stop: impl Into<String>) -> Self {
        self.range = Range::new(start, stop);
        self
    }

    /// Build the specification; selects `value` if no field was added
    pub fn build(self) -> QuerySpec {
        let fields = if self.fields.is_empty() {
            vec!["value".to_string()]
        } else {
            self.fields
        };

        QuerySpec {
            bucket: self.bucket,
            measurement: self.measurement,
            fields,
            filters: self.filters,
            aggregate: self.aggregate,
            range: self.range,
        }
    }
}
