use crate::domain::model::{DecodedArchive, MergedDataset, ResultTable, RunSummary};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Paths relative to the storage root, sorted, whose name ends in `.{extension}`.
    fn list_files(
        &self,
        extension: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
}

/// Writes one result table under a name; returns where it landed.
pub trait ReportSink: Send + Sync {
    fn write(
        &self,
        name: &str,
        table: &ResultTable,
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum SchemaMismatchPolicy {
    /// Warn, count the table as rejected and keep merging.
    #[default]
    Drop,
    /// Fail the whole merge.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// Header names accepted for each interpreted trip field; first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub start_time: Vec<String>,
    pub trip_duration_seconds: Vec<String>,
    pub from_station_id: Vec<String>,
    pub from_station_name: Vec<String>,
    pub gender: Vec<String>,
    pub birth_year: Vec<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            start_time: names(&["start_time"]),
            trip_duration_seconds: names(&["trip_duration_seconds", "tripduration"]),
            from_station_id: names(&["from_station_id"]),
            from_station_name: names(&["from_station_name"]),
            gender: names(&["gender"]),
            birth_year: names(&["birth_year", "birthyear"]),
        }
    }
}

pub trait ConfigProvider: Send + Sync {
    fn input_path(&self) -> &str;
    fn output_path(&self) -> &str;
    fn archive_extension(&self) -> &str {
        "zip"
    }
    fn table_extension(&self) -> &str {
        "csv"
    }
    fn schema_mismatch_policy(&self) -> SchemaMismatchPolicy;
    fn output_format(&self) -> OutputFormat;
    fn column_mapping(&self) -> ColumnMapping {
        ColumnMapping::default()
    }
    fn max_parallel_archives(&self) -> usize;
}

/// Outcome of the transform step: the merge bookkeeping plus every result.
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub dataset: std::sync::Arc<MergedDataset>,
    pub results: Vec<ResultTable>,
    pub summary: RunSummary,
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Reads and decodes every archive. Failed archives are recorded in the
    /// summary instead of failing the step.
    async fn extract(&self) -> Result<(Vec<DecodedArchive>, RunSummary)>;
    async fn transform(
        &self,
        archives: Vec<DecodedArchive>,
        summary: RunSummary,
    ) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<RunSummary>;
}
