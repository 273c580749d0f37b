use crate::domain::model::{ArchiveEntry, DecodedArchive, MergedDataset, TripRecord};
use crate::domain::ports::{ColumnMapping, SchemaMismatchPolicy};
use crate::utils::error::{EtlError, Result};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Bookkeeping for the tables the merge looked at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub tables_merged: usize,
    pub empty_tables_skipped: usize,
    /// `(table, reason)` for every non-empty table left out of the dataset.
    pub tables_rejected: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct MergeOutcome {
    pub dataset: MergedDataset,
    pub report: MergeReport,
}

/// Column positions of the interpreted fields inside one source table.
struct FieldIndex {
    start_time: usize,
    trip_duration_seconds: usize,
    from_station_id: usize,
    from_station_name: usize,
    gender: Option<usize>,
    birth_year: Option<usize>,
}

impl FieldIndex {
    fn resolve(table: &str, columns: &[String], mapping: &ColumnMapping) -> Result<Self> {
        let find = |aliases: &[String]| {
            aliases
                .iter()
                .find_map(|alias| columns.iter().position(|c| c.trim() == alias))
        };
        let require = |field: &str, aliases: &[String]| {
            find(aliases).ok_or_else(|| EtlError::MissingColumnError {
                table: table.to_string(),
                field: field.to_string(),
            })
        };

        Ok(Self {
            start_time: require("start_time", &mapping.start_time)?,
            trip_duration_seconds: require(
                "trip_duration_seconds",
                &mapping.trip_duration_seconds,
            )?,
            from_station_id: require("from_station_id", &mapping.from_station_id)?,
            from_station_name: require("from_station_name", &mapping.from_station_name)?,
            gender: find(&mapping.gender),
            birth_year: find(&mapping.birth_year),
        })
    }
}

/// The established schema: column order plus the set used for comparison.
struct Schema {
    columns: Vec<String>,
    set: BTreeSet<String>,
}

/// Folds decoded archives into one `MergedDataset`.
///
/// The first non-empty table fixes the schema. Later tables must carry the
/// same column set (in any order); what happens to those that don't is
/// governed by the `SchemaMismatchPolicy`.
#[derive(Debug, Clone, Default)]
pub struct RecordMerger {
    policy: SchemaMismatchPolicy,
    mapping: ColumnMapping,
}

impl RecordMerger {
    pub fn new(policy: SchemaMismatchPolicy, mapping: ColumnMapping) -> Self {
        Self { policy, mapping }
    }

    pub fn merge(&self, archives: Vec<DecodedArchive>) -> Result<MergeOutcome> {
        let mut schema: Option<Schema> = None;
        let mut records = Vec::new();
        let mut report = MergeReport::default();

        for archive in archives {
            for entry in archive.entries {
                let label = format!("{}/{}", archive.archive, entry.name);

                if entry.table.is_empty() {
                    tracing::warn!("⚠️ Table {} is empty, skipping", label);
                    report.empty_tables_skipped += 1;
                    continue;
                }

                match self.accept(&label, &entry, schema.as_ref()) {
                    Ok((table_schema, rows)) => {
                        if schema.is_none() {
                            tracing::info!(
                                "Dataset schema set by {}: {:?}",
                                label,
                                table_schema.columns
                            );
                            schema = Some(table_schema);
                        }
                        tracing::debug!("Merged {} rows from {}", rows.len(), label);
                        records.extend(rows);
                        report.tables_merged += 1;
                    }
                    Err(e) => match self.policy {
                        SchemaMismatchPolicy::Abort => return Err(e),
                        SchemaMismatchPolicy::Drop => {
                            tracing::warn!("⚠️ Dropping table {}: {}", label, e);
                            report.tables_rejected.push((label, e.to_string()));
                        }
                    },
                }
            }
        }

        let columns = schema.map(|s| s.columns).unwrap_or_default();
        Ok(MergeOutcome {
            dataset: MergedDataset::new(columns, records),
            report,
        })
    }

    /// Validates one non-empty table against `schema` (or against itself when
    /// no schema exists yet) and converts its rows. All or nothing.
    fn accept(
        &self,
        label: &str,
        entry: &ArchiveEntry,
        schema: Option<&Schema>,
    ) -> Result<(Schema, Vec<TripRecord>)> {
        let columns = &entry.table.columns;
        let set: BTreeSet<String> = columns.iter().cloned().collect();

        let target = match schema {
            Some(existing) if existing.set != set => {
                return Err(EtlError::SchemaMismatchError {
                    table: label.to_string(),
                    expected: existing.columns.clone(),
                    found: columns.clone(),
                });
            }
            Some(existing) => existing.columns.clone(),
            None => columns.clone(),
        };

        let index = FieldIndex::resolve(label, columns, &self.mapping)?;
        // layout[i] = source position of dataset column i
        let layout: Vec<usize> = target
            .iter()
            .map(|name| columns.iter().position(|c| c == name).unwrap_or_default())
            .collect();

        let rows = entry
            .table
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| to_record(label, i + 1, row, &index, &layout))
            .collect::<Result<Vec<_>>>()?;

        Ok((Schema { columns: target, set }, rows))
    }
}

fn to_record(
    table: &str,
    row_number: usize,
    row: &[String],
    index: &FieldIndex,
    layout: &[usize],
) -> Result<TripRecord> {
    let invalid = |field: &str, value: &str, reason: &str| EtlError::InvalidFieldError {
        table: table.to_string(),
        row: row_number,
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let cell = |i: usize| row.get(i).map(|c| c.trim()).unwrap_or_default();

    let start_raw = cell(index.start_time);
    let start_time = parse_timestamp(start_raw)
        .ok_or_else(|| invalid("start_time", start_raw, "unrecognized timestamp format"))?;

    let duration_raw = cell(index.trip_duration_seconds);
    let trip_duration_seconds = parse_duration(duration_raw)
        .ok_or_else(|| invalid("trip_duration_seconds", duration_raw, "not a number"))?;

    let birth_year = match index.birth_year.map(cell) {
        None | Some("") => None,
        Some(raw) => Some(
            parse_year(raw).ok_or_else(|| invalid("birth_year", raw, "not an integer year"))?,
        ),
    };

    let gender = index
        .gender
        .map(cell)
        .filter(|g| !g.is_empty())
        .map(str::to_string);

    Ok(TripRecord {
        start_time,
        trip_duration_seconds,
        from_station_id: cell(index.from_station_id).to_string(),
        from_station_name: cell(index.from_station_name).to_string(),
        gender,
        birth_year,
        values: layout
            .iter()
            .map(|&i| row.get(i).cloned().unwrap_or_default())
            .collect(),
    })
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

/// Accepts thousands separators, e.g. `1,062.0`.
fn parse_duration(raw: &str) -> Option<f64> {
    raw.replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn parse_year(raw: &str) -> Option<i32> {
    raw.parse::<i32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && v.abs() < i32::MAX as f64)
            .map(|v| v as i32)
    })
}
