//! Flux Script Compiler
//!
//! Renders a validated [`QuerySpec`] into the store's pipeline dialect.
//!
//! # Stage Order
//!
//! ```text
//! from → range → measurement → fields → [tags] → [aggregateWindow] → group → drop
//! ```
//!
//! Stages are evaluated left to right by the store, so every filter runs
//! before the window reduction, and grouping runs while the tag columns it
//! partitions on still exist.
//!
//! Filter values are wrapped in double quotes without escaping. A value that
//! contains `"` breaks out of the literal; callers must reject such values
//! before building a specification.

use crate::query::error::QueryResult;
use crate::query::spec::{Aggregate, KeyValue, QuerySpec, Range};
use chrono::{DateTime, Utc};

/// Columns the result is partitioned by
pub const GROUP_COLUMNS: [&str; 3] = ["sensor_mac", "sensor_type", "receive_no"];

/// Columns that survive the final projection
pub const KEPT_COLUMNS: [&str; 4] = ["_value", "_time", "sensor_type", "sensor_mac"];

/// A query shape that can be checked and rendered to a script
///
/// [`QuerySpec`] is the general-purpose implementation; callers with a
/// fixed query layout can implement this for their own types and run them
/// through the same service.
pub trait FluxQuery {
    /// Check invariants against a fixed `now`
    fn validate_at(&self, now: DateTime<Utc>) -> QueryResult<()>;

    /// Render the script; only meaningful after a successful validation
    fn to_flux(&self) -> String;
}

impl FluxQuery for QuerySpec {
    fn validate_at(&self, now: DateTime<Utc>) -> QueryResult<()> {
        QuerySpec::validate_at(self, now)
    }

    fn to_flux(&self) -> String {
        compile(self)
    }
}

/// Render the full script, one stage per line
///
/// The specification must already have passed [`QuerySpec::validate`];
/// the output for an invalid specification is unspecified.
pub fn compile(spec: &QuerySpec) -> String {
    compile_stages(spec).join("\n")
}

/// Render each stage separately, in pipeline order
pub fn compile_stages(spec: &QuerySpec) -> Vec<String> {
    let mut stages = vec![
        source_stage(&spec.bucket),
        range_stage(&spec.range),
        measurement_stage(&spec.measurement),
        field_stage(&spec.fields),
    ];

    if let Some(tags) = tag_filter_stage(&spec.filters) {
        stages.push(tags);
    }
    if let Some(aggregate) = aggregate_stage(&spec.aggregate) {
        stages.push(aggregate);
    }

    stages.push(group_stage());
    stages.push(projection_stage());
    stages
}

/// `from(bucket: "<bucket>")`
pub fn source_stage(bucket: &str) -> String {
    format!("from(bucket: \"{}\")", bucket)
}

/// Range restriction using the literal bound expressions
pub fn range_stage(range: &Range) -> String {
    format!(" |> range(start: {}, stop: {})", range.start, range.stop)
}

/// Equality filter on the measurement name
pub fn measurement_stage(measurement: &str) -> String {
    filter_stage(&format!("r._measurement == \"{}\"", measurement))
}

/// OR-combined equality filter on the field names
pub fn field_stage(fields: &[String]) -> String {
    let predicate = fields
        .iter()
        .map(|f| format!("r._field == \"{}\"", f))
        .collect::<Vec<_>>()
        .join(" or ");
    filter_stage(&predicate)
}

/// AND-combined tag equality filter; `None` when there are no filters
pub fn tag_filter_stage(filters: &[KeyValue]) -> Option<String> {
    if filters.is_empty() {
        return None;
    }

    let predicate = filters
        .iter()
        .map(|kv| format!("r.{} == \"{}\"", kv.key, kv.value))
        .collect::<Vec<_>>()
        .join(" and ");
    Some(filter_stage(&predicate))
}

/// Windowed reduction; `None` when aggregation is disabled
pub fn aggregate_stage(aggregate: &Aggregate) -> Option<String> {
    if !aggregate.enabled {
        return None;
    }

    Some(format!(
        " |> aggregateWindow(every: {}, fn: {}, createEmpty: {})",
        aggregate.every, aggregate.func, aggregate.create_empty
    ))
}

/// Partition rows per sensor and channel
pub fn group_stage() -> String {
    let columns = GROUP_COLUMNS
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" |> group(columns: [{}])", columns)
}

/// Drop every column the decoder does not read
pub fn projection_stage() -> String {
    let predicate = KEPT_COLUMNS
        .iter()
        .map(|c| format!("column != \"{}\"", c))
        .collect::<Vec<_>>()
        .join(" and ");
    format!(" |> drop(fn: (column) => {})", predicate)
}

fn filter_stage(predicate: &str) -> String {
    format!(" |> filter(fn: (r) => {})", predicate)
}
