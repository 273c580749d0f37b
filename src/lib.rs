pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{LocalStorage, StorageSink};
pub use config::toml_config::TomlConfig;
pub use core::{
    aggregation::{AggregationEngine, Query},
    decoder::ArchiveDecoder,
    etl::EtlEngine,
    merger::RecordMerger,
    pipeline::TripPipeline,
};
pub use utils::error::{EtlError, Result};
