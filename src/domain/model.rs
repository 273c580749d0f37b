use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use std::fmt;

/// One already-retrieved archive, as handed to the decoder.
#[derive(Debug, Clone)]
pub struct ArchiveBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A delimited-text table: header plus string cells, one `Vec` per row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub name: String,
    pub table: Table,
}

/// Everything one archive contributed, in container order.
#[derive(Debug, Clone)]
pub struct DecodedArchive {
    pub archive: String,
    pub entries: Vec<ArchiveEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub start_time: NaiveDateTime,
    pub trip_duration_seconds: f64,
    pub from_station_id: String,
    pub from_station_name: String,
    pub gender: Option<String>,
    pub birth_year: Option<i32>,
    /// Every cell of the source row, laid out in dataset schema order.
    pub values: Vec<String>,
}

/// The union of all accepted tables. Built once by the merger and only
/// read afterwards.
#[derive(Debug, Clone, Default)]
pub struct MergedDataset {
    columns: Vec<String>,
    records: Vec<TripRecord>,
}

impl MergedDataset {
    pub fn new(columns: Vec<String>, records: Vec<TripRecord>) -> Self {
        Self { columns, records }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[TripRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(v) => serializer.serialize_str(v),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Output of one aggregation query. Column and row order are part of the
/// query's contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Counts that make skipped input visible after a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub archives_total: usize,
    pub archives_failed: Vec<(String, String)>,
    pub tables_merged: usize,
    pub empty_tables_skipped: usize,
    pub tables_rejected: Vec<(String, String)>,
    pub rows_merged: usize,
    pub results_written: Vec<(String, String)>,
    pub results_failed: Vec<(String, String)>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.results_failed.is_empty()
    }

    pub fn skipped_inputs(&self) -> usize {
        self.archives_failed.len() + self.empty_tables_skipped + self.tables_rejected.len()
    }
}
