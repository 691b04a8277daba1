//! Annotated CSV Results
//!
//! Reads the store's annotated CSV result format lazily, one [`Record`] per
//! data row:
//!
//! ```text
//! #group,false,false,true,true,false,false,true
//! #datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string
//! #default,_result,,,,,,
//! ,result,table,_start,_stop,_time,_value,sensor_type
//! ,,0,2024-01-15T13:00:00Z,2024-01-15T14:00:00Z,2024-01-15T13:05:00Z,21.5,temperature
//! ```
//!
//! A result may hold several tables, each starting with its own annotations
//! or header. Empty cells take the `#default` value, or are absent when the
//! default is empty too. An error table (header `,error,reference`) ends the
//! stream with [`StoreError::Upstream`].

use super::{Record, StoreError, StoreResult};
use crate::query::Value;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const TIME_COLUMN: &str = "_time";

/// Columns read as timestamps when the result carries no `#datatype`
const TIME_COLUMNS: [&str; 3] = ["_start", "_stop", "_time"];

/// Lazy row iterator over an annotated CSV result
pub struct AnnotatedCsvRows<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    table: TableLayout,
    done: bool,
}

/// Annotations and header of the table being read
#[derive(Debug, Default)]
struct TableLayout {
    datatypes: Vec<String>,
    defaults: Vec<String>,
    header: Option<Vec<String>>,
}

impl<R: Read> AnnotatedCsvRows<R> {
    /// Read a result from any byte source
    pub fn new(reader: R) -> Self {
        let records = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader)
            .into_records();

        Self {
            records,
            table: TableLayout::default(),
            done: false,
        }
    }

    fn handle(&mut self, record: csv::StringRecord) -> Option<StoreResult<Record>> {
        let first = record.get(0).unwrap_or("");

        if first.starts_with('#') {
            if self.table.header.is_some() {
                self.table = TableLayout::default();
            }
            let cells = record.iter().map(str::to_string).collect();
            match first {
                "#datatype" => self.table.datatypes = cells,
                "#default" => self.table.defaults = cells,
                _ => {}
            }
            return None;
        }

        if is_header(&record) {
            if self.table.header.is_some() {
                self.table = TableLayout::default();
            }
            self.table.header = Some(record.iter().map(str::to_string).collect());
            return None;
        }

        Some(self.table.to_record(&record))
    }
}

impl AnnotatedCsvRows<File> {
    /// Read a result previously saved to disk
    pub fn from_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read> Iterator for AnnotatedCsvRows<R> {
    type Item = StoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };

            if let Some(row) = self.handle(record) {
                if row.is_err() {
                    self.done = true;
                }
                return Some(row);
            }
        }
        None
    }
}

impl TableLayout {
    fn to_record(&self, record: &csv::StringRecord) -> StoreResult<Record> {
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| StoreError::MalformedResult("data row before header".to_string()))?;

        if let Some(idx) = header.iter().position(|h| h == "error") {
            let message = record.get(idx).unwrap_or("").to_string();
            return Err(StoreError::Upstream(message));
        }

        let mut cells = Vec::with_capacity(header.len());
        let mut time = None;

        // Column 0 carries annotation names and is never data
        for (idx, column) in header.iter().enumerate().skip(1) {
            let raw = match record.get(idx).unwrap_or("") {
                "" => self.defaults.get(idx).map(String::as_str).unwrap_or(""),
                raw => raw,
            };
            if raw.is_empty() {
                continue;
            }

            let value = parse_cell(raw, self.datatype(idx, column))?;
            if column == TIME_COLUMN {
                if let Value::Time(t) = value {
                    time = Some(t);
                }
            }
            cells.push((column.clone(), value));
        }

        let time = time.ok_or_else(|| {
            StoreError::MalformedResult(format!("row has no {} timestamp", TIME_COLUMN))
        })?;

        Ok(cells
            .into_iter()
            .fold(Record::new(time), |record, (column, value)| record.with(column, value)))
    }

    fn datatype<'a>(&'a self, idx: usize, column: &str) -> &'a str {
        match self.datatypes.get(idx) {
            Some(datatype) => datatype.as_str(),
            None if TIME_COLUMNS.contains(&column) => "dateTime:RFC3339",
            None => "string",
        }
    }
}

fn is_header(record: &csv::StringRecord) -> bool {
    record.get(0) == Some("") && matches!(record.get(1), Some("result") | Some("error"))
}

fn parse_cell(raw: &str, datatype: &str) -> StoreResult<Value> {
    let bad = || StoreError::MalformedResult(format!("cannot read {:?} as {}", raw, datatype));

    Ok(match datatype {
        "double" => Value::Float64(raw.parse().map_err(|_| bad())?),
        "long" => Value::Int64(raw.parse().map_err(|_| bad())?),
        "unsignedLong" => Value::UInt64(raw.parse().map_err(|_| bad())?),
        "boolean" => Value::Bool(raw.parse().map_err(|_| bad())?),
        "dateTime:RFC3339" | "dateTime:RFC3339Nano" => Value::Time(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|_| bad())?
                .with_timezone(&Utc),
        ),
        _ => Value::String(raw.to_string()),
    })
}
