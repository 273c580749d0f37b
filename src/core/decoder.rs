use crate::domain::model::{ArchiveEntry, DecodedArchive, Table};
use crate::utils::error::{EtlError, Result};
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Pulls the delimited-text tables out of one ZIP blob.
///
/// Stateless: one decoder is shared by every worker. Tables are read as
/// UTF-8 with a header row.
#[derive(Debug, Clone)]
pub struct ArchiveDecoder {
    table_suffix: String,
}

impl Default for ArchiveDecoder {
    fn default() -> Self {
        Self::new("csv")
    }
}

impl ArchiveDecoder {
    pub fn new(table_extension: &str) -> Self {
        Self {
            table_suffix: format!(".{}", table_extension.to_ascii_lowercase()),
        }
    }

    fn is_table(&self, entry_name: &str) -> bool {
        // macOS zips carry `__MACOSX/._name.csv` resource forks that are not text.
        !entry_name.starts_with("__MACOSX/")
            && entry_name.to_ascii_lowercase().ends_with(&self.table_suffix)
    }

    /// Decodes every table entry of `blob`, in container order.
    ///
    /// Fails with `CorruptArchiveError` when the container or an entry stream
    /// can't be read, and with `DecodeError` when any row of any table is not
    /// valid text. Either way nothing from this archive is returned.
    pub fn decode(&self, archive: &str, blob: &[u8]) -> Result<DecodedArchive> {
        let corrupt = |message: String| EtlError::CorruptArchiveError {
            archive: archive.to_string(),
            message,
        };

        let mut zip = ZipArchive::new(Cursor::new(blob)).map_err(|e| corrupt(e.to_string()))?;
        let mut entries = Vec::new();

        for index in 0..zip.len() {
            let mut file = zip.by_index(index).map_err(|e| corrupt(e.to_string()))?;
            if file.is_dir() || !self.is_table(file.name()) {
                tracing::debug!("Skipping non-table entry '{}' in {}", file.name(), archive);
                continue;
            }

            let name = file.name().to_string();
            // declared sizes are untrusted; no entry can inflate past what is read
            let mut raw = Vec::with_capacity(file.size().min(blob.len() as u64) as usize);
            file.read_to_end(&mut raw)
                .map_err(|e| corrupt(format!("{}: {}", name, e)))?;

            let table = parse_table(archive, &name, &raw)?;
            tracing::debug!(
                "Decoded '{}' from {}: {} columns, {} rows",
                name,
                archive,
                table.columns.len(),
                table.rows.len()
            );
            entries.push(ArchiveEntry { name, table });
        }

        Ok(DecodedArchive {
            archive: archive.to_string(),
            entries,
        })
    }
}

fn parse_table(archive: &str, entry: &str, raw: &[u8]) -> Result<Table> {
    let decode_error = |err: csv::Error| EtlError::DecodeError {
        archive: archive.to_string(),
        entry: entry.to_string(),
        line: err.position().map(|p| p.line()).unwrap_or(1),
        message: err.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(raw);

    let columns: Vec<String> = reader
        .headers()
        .map_err(decode_error)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(decode_error)?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Table { columns, rows })
}
