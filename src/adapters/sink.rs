use crate::domain::model::ResultTable;
use crate::domain::ports::{OutputFormat, ReportSink, Storage};
use crate::utils::error::{EtlError, Result};
use serde_json::{Map, Value as JsonValue};

/// Serializes result tables and writes them through a `Storage`, one
/// directory per result: `<name>/part-00000.<ext>`.
#[derive(Debug, Clone)]
pub struct StorageSink<S: Storage> {
    storage: S,
    format: OutputFormat,
}

impl<S: Storage> StorageSink<S> {
    pub fn new(storage: S, format: OutputFormat) -> Self {
        Self { storage, format }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn render(&self, table: &ResultTable) -> Result<Vec<u8>> {
        match self.format {
            OutputFormat::Csv => render_csv(table),
            OutputFormat::Json => render_json(table),
        }
    }
}

fn render_csv(table: &ResultTable) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.into_inner().map_err(|e| EtlError::ProcessingError {
        message: format!("Failed to flush CSV for {}: {}", table.name, e),
    })
}

/// An array of objects keyed by column name, keys in column order.
fn render_json(table: &ResultTable) -> Result<Vec<u8>> {
    let rows = table
        .rows
        .iter()
        .map(|row| -> Result<JsonValue> {
            let mut object = Map::new();
            for (column, value) in table.columns.iter().zip(row) {
                object.insert(column.clone(), serde_json::to_value(value)?);
            }
            Ok(JsonValue::Object(object))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(serde_json::to_vec_pretty(&rows)?)
}

impl<S: Storage> ReportSink for StorageSink<S> {
    async fn write(&self, name: &str, table: &ResultTable) -> Result<String> {
        let path = format!("{}/part-00000.{}", name, self.format.extension());
        let data = self.render(table)?;

        tracing::debug!("Writing {} ({} rows, {} bytes)", path, table.len(), data.len());
        self.storage
            .write_file(&path, &data)
            .await
            .map_err(|e| EtlError::SinkError {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(path)
    }
}
