//! Store Session Seam
//!
//! The core never talks to the store itself. A [`StoreClient`] is built once
//! at startup and handed to the [`QueryService`](crate::service::QueryService),
//! which submits compiled scripts through it and decodes the rows it returns.
//!
//! - **Record**: a concrete result row implementing [`Row`]
//! - **AnnotatedCsvRows**: lazy reader over the store's annotated CSV format
//! - **ReplayClient**: serves a pre-fetched result for every script

mod annotated_csv;
mod replay;

pub use annotated_csv::AnnotatedCsvRows;
pub use replay::ReplayClient;

use crate::query::{Row, Value};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by a store session or its row stream
#[derive(Error, Debug)]
pub enum StoreError {
    /// Session could not reach the store
    #[error("Connection error: {0}")]
    Connection(String),

    /// Store refused the script
    #[error("Query rejected: {0}")]
    Rejected(String),

    /// Store reported an error inside the result stream
    #[error("Query failed: {0}")]
    Upstream(String),

    /// Result stream is not in the expected format
    #[error("Malformed result: {0}")]
    MalformedResult(String),

    /// IO error while reading a result
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV framing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Row stream returned by a store session, consumed once
pub type Rows = Box<dyn Iterator<Item = StoreResult<Record>> + Send>;

/// A session with the time-series store
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Submit a script on behalf of `org` and return its rows
    async fn query(&self, org: &str, script: &str) -> StoreResult<Rows>;
}

/// One row of a result table
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    time: DateTime<Utc>,
    values: HashMap<String, Value>,
}

impl Record {
    /// Create a row with no cells
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time,
            values: HashMap::new(),
        }
    }

    /// Builder method: set a cell
    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.values.insert(column.into(), value);
        self
    }

    /// All present cells
    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }
}

impl Row for Record {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn value_by_key(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::decode;
    use chrono::TimeZone;

    #[test]
    fn test_record_decodes() {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let record = Record::new(t)
            .with("_value", Value::Float64(2.5))
            .with("sensor_type", Value::String("humidity".to_string()));

        let samples = decode(vec![Ok::<_, StoreError>(record)]).unwrap();
        assert_eq!(samples[0].timestamp, t);
        assert_eq!(samples[0].value, Some(2.5));
        assert_eq!(samples[0].tag, "humidity");
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::Upstream("bucket not found".to_string());
        assert_eq!(err.to_string(), "Query failed: bucket not found");
    }
}
