pub mod toml_config;

use crate::utils::error::Result;
use crate::utils::validation;

#[cfg(feature = "cli")]
use crate::core::{ConfigProvider, OutputFormat, SchemaMismatchPolicy};
#[cfg(feature = "cli")]
use crate::utils::validation::Validate;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};

pub const MAX_PARALLEL_ARCHIVES: usize = 256;

/// Worker count used when none is configured.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

pub(crate) fn validate_common(
    input_path: &str,
    output_path: &str,
    max_parallel: usize,
) -> Result<()> {
    validation::validate_path("input_path", input_path)?;
    validation::validate_path("output_path", output_path)?;
    validation::validate_positive_number("max_parallel_archives", max_parallel, 1)?;
    validation::validate_range("max_parallel_archives", max_parallel, 1, MAX_PARALLEL_ARCHIVES)?;
    Ok(())
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "trip-analytics")]
#[command(about = "Merge zipped trip archives and compute daily, monthly and station reports")]
pub struct CliConfig {
    /// Directory holding the *.zip trip archives
    #[arg(long, default_value = "./data")]
    pub input_path: String,

    /// Directory the six reports are written under
    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// What to do with a table whose columns differ from the first table
    #[arg(long, value_enum, default_value_t = SchemaMismatchPolicy::Drop)]
    pub on_schema_mismatch: SchemaMismatchPolicy,

    /// Archives decoded concurrently (defaults to available cores)
    #[arg(long)]
    pub max_parallel_archives: Option<usize>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn input_path(&self) -> &str {
        &self.input_path
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn schema_mismatch_policy(&self) -> SchemaMismatchPolicy {
        self.on_schema_mismatch
    }

    fn output_format(&self) -> OutputFormat {
        self.format
    }

    fn max_parallel_archives(&self) -> usize {
        self.max_parallel_archives.unwrap_or_else(default_parallelism)
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_common(
            &self.input_path,
            &self.output_path,
            self.max_parallel_archives(),
        )
    }
}
