pub mod aggregation;
pub mod decoder;
pub mod etl;
pub mod merger;
pub mod pipeline;

pub use crate::domain::model::{
    ArchiveBlob, ArchiveEntry, DecodedArchive, MergedDataset, ResultTable, RunSummary, Table,
    TripRecord, Value,
};
pub use crate::domain::ports::{
    ColumnMapping, ConfigProvider, OutputFormat, Pipeline, ReportSink, SchemaMismatchPolicy,
    Storage, TransformResult,
};
pub use crate::utils::error::Result;
