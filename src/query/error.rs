//! Query error types
//!
//! Defines every error condition raised while parsing time expressions,
//! validating a query specification, and decoding a result stream.

use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Text is neither `now()`, a duration literal, nor a UTC timestamp
    #[error("Malformed time expression: {0}")]
    MalformedTime(String),

    /// Time expression resolves to an instant that is not in the past
    #[error("Time must be before now: {0}")]
    FutureTime(String),

    /// Duration literal is zero or negative where a positive one is required
    #[error("Duration must be positive: {0}")]
    NonPositiveDuration(String),

    /// A required field of the specification is empty
    #[error("Required field is empty: {0}")]
    EmptyRequiredField(String),

    /// Aggregate reducer is not one of the supported functions
    #[error("Invalid aggregate function: {0} (expected mean or median)")]
    InvalidAggregateFunction(String),

    /// Range bounds are missing or out of order
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// A result cell held a scalar the decoder cannot represent
    #[error("Unsupported value type in column {column}: {found}")]
    UnsupportedValueType { column: String, found: String },

    /// The upstream row iterator reported an error
    #[error("Query parsing error: {0}")]
    UpstreamIteration(String),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
