//! Sensor Query Requests
//!
//! Maps the request body used by dashboards onto a [`QuerySpec`]. Each
//! optional filter maps to a tag column through a fixed table, and only the
//! filters the caller supplied produce a clause.

use crate::query::error::{QueryError, QueryResult};
use crate::query::spec::{Aggregate, AggregateFn, KeyValue, QuerySpec, Range};
use crate::query::time::format_utc;
use chrono::{LocalResult, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Layout of request timestamps (`YYYY-MM-DD hh:mm:ss`, local wall clock)
pub const REQUEST_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// Field selected by sensor requests
pub const SENSOR_FIELD: &str = "value";

type Accessor = fn(&SensorFilter) -> Option<&str>;

/// Tag column for each filter, in clause order
const FILTER_COLUMNS: [(&str, Accessor); 4] = [
    ("project_id", project_id),
    ("sensor_mac", sensor_mac),
    ("sensor_type", sensor_type),
    ("receive_no", receive_no),
];

fn project_id(f: &SensorFilter) -> Option<&str> {
    f.project_id.as_deref()
}

fn sensor_mac(f: &SensorFilter) -> Option<&str> {
    f.sensor_mac.as_deref()
}

fn sensor_type(f: &SensorFilter) -> Option<&str> {
    f.sensor_type.as_deref()
}

fn receive_no(f: &SensorFilter) -> Option<&str> {
    f.receive_no.as_deref()
}

/// Optional tag filters of a sensor request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorFilter {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub sensor_mac: Option<String>,
    #[serde(default)]
    pub sensor_type: Option<String>,
    #[serde(default)]
    pub receive_no: Option<String>,
}

impl SensorFilter {
    /// Tag filters for every supplied value, in table order
    pub fn to_filters(&self) -> Vec<KeyValue> {
        FILTER_COLUMNS
            .iter()
            .filter_map(|(column, get)| get(self).map(|value| KeyValue::new(*column, value)))
            .collect()
    }

    /// Require every filter to be present and non-empty
    ///
    /// Single-series queries identify exactly one channel of one sensor.
    pub fn require_complete(&self) -> QueryResult<()> {
        for (column, get) in FILTER_COLUMNS.iter() {
            match get(self) {
                Some(value) if !value.is_empty() => {}
                _ => return Err(QueryError::EmptyRequiredField(column.to_string())),
            }
        }
        Ok(())
    }
}

/// Time-series request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorQueryRequest {
    pub measurement: String,
    /// Wall-clock start in [`REQUEST_LAYOUT`]
    pub start: String,
    /// Wall-clock stop in [`REQUEST_LAYOUT`]
    pub stop: String,
    /// Aggregation window, a duration literal
    pub interval: String,
    #[serde(default)]
    pub filter: SensorFilter,
}

impl SensorQueryRequest {
    /// Build a mean-aggregated specification over the `value` field
    ///
    /// `start` and `stop` are read as wall-clock times in `tz` and emitted as
    /// UTC timestamps.
    pub fn to_spec<Tz: TimeZone>(&self, bucket: &str, tz: &Tz) -> QueryResult<QuerySpec> {
        let start = to_utc_literal(&self.start, tz)?;
        let stop = to_utc_literal(&self.stop, tz)?;

        Ok(QuerySpec {
            bucket: bucket.to_string(),
            measurement: self.measurement.clone(),
            fields: vec![SENSOR_FIELD.to_string()],
            filters: self.filter.to_filters(),
            aggregate: Aggregate::every(self.interval.clone(), AggregateFn::Mean),
            range: Range::new(start, stop),
        })
    }

    /// Same as [`to_spec`](Self::to_spec) using the host's local time zone
    pub fn to_local_spec(&self, bucket: &str) -> QueryResult<QuerySpec> {
        self.to_spec(bucket, &chrono::Local)
    }
}

/// Convert a wall-clock time in `tz` to a UTC timestamp literal
fn to_utc_literal<Tz: TimeZone>(text: &str, tz: &Tz) -> QueryResult<String> {
    let naive = NaiveDateTime::parse_from_str(text, REQUEST_LAYOUT)
        .map_err(|_| QueryError::MalformedTime(text.to_string()))?;

    let local = match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t,
        // Ambiguous wall-clock times (DST fall-back) take the earlier instant
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => return Err(QueryError::MalformedTime(text.to_string())),
    };

    Ok(format_utc(local.with_timezone(&Utc)))
}
