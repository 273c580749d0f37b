use crate::core::{ColumnMapping, ConfigProvider, OutputFormat, SchemaMismatchPolicy};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
    pub performance: Option<PerformanceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub input_path: String,
    pub archive_extension: Option<String>,
    pub table_extension: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeConfig {
    pub on_schema_mismatch: Option<SchemaMismatchPolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Unlisted fields keep their default header names.
    pub columns: Option<ColumnMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    /// `compact` (default) or `json`.
    pub log_format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_parallel_archives: Option<usize>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${TRIP_DATA_DIR})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;
        super::validate_common(
            &self.source.input_path,
            &self.load.output_path,
            self.max_parallel_archives(),
        )?;
        validation::validate_extension("source.archive_extension", self.archive_extension())?;
        validation::validate_extension("source.table_extension", self.table_extension())?;

        if let Some(format) = self.monitoring.as_ref().and_then(|m| m.log_format.as_deref()) {
            validation::validate_one_of("monitoring.log_format", format, &["compact", "json"])?;
        }

        let mapping = self.column_mapping();
        for (field, aliases) in [
            ("start_time", &mapping.start_time),
            ("trip_duration_seconds", &mapping.trip_duration_seconds),
            ("from_station_id", &mapping.from_station_id),
            ("from_station_name", &mapping.from_station_name),
        ] {
            if aliases.is_empty() {
                return Err(EtlError::InvalidConfigValueError {
                    field: format!("schema.columns.{}", field),
                    value: "[]".to_string(),
                    reason: "At least one header name is required".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.log_format.as_deref())
            .is_some_and(|f| f == "json")
    }
}

impl ConfigProvider for TomlConfig {
    fn input_path(&self) -> &str {
        &self.source.input_path
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn archive_extension(&self) -> &str {
        self.source.archive_extension.as_deref().unwrap_or("zip")
    }

    fn table_extension(&self) -> &str {
        self.source.table_extension.as_deref().unwrap_or("csv")
    }

    fn schema_mismatch_policy(&self) -> SchemaMismatchPolicy {
        self.merge.on_schema_mismatch.unwrap_or_default()
    }

    fn output_format(&self) -> OutputFormat {
        self.load.format.unwrap_or_default()
    }

    fn column_mapping(&self) -> ColumnMapping {
        self.schema.columns.clone().unwrap_or_default()
    }

    fn max_parallel_archives(&self) -> usize {
        self.performance
            .as_ref()
            .and_then(|p| p.max_parallel_archives)
            .unwrap_or_else(super::default_parallelism)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[pipeline]
name = "divvy-2019"
version = "1.0"

[source]
input_path = "./data"

[load]
output_path = "./output"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = TomlConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.pipeline.name, "divvy-2019");
        assert_eq!(config.archive_extension(), "zip");
        assert_eq!(config.table_extension(), "csv");
        assert_eq!(config.schema_mismatch_policy(), SchemaMismatchPolicy::Drop);
        assert_eq!(config.output_format(), OutputFormat::Csv);
        assert_eq!(config.column_mapping(), ColumnMapping::default());
        assert!(!config.monitoring_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[pipeline]
name = "divvy-2019"
description = "Quarterly Divvy exports"
version = "1.0"

[source]
input_path = "./data"
table_extension = "csv"

[merge]
on_schema_mismatch = "abort"

[schema.columns]
trip_duration_seconds = ["01 - Rental Details Duration In Seconds Uncapped"]

[load]
output_path = "./reports"
format = "json"

[monitoring]
enabled = true
log_format = "json"

[performance]
max_parallel_archives = 2
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.schema_mismatch_policy(), SchemaMismatchPolicy::Abort);
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.max_parallel_archives(), 2);
        assert!(config.monitoring_enabled());
        assert!(config.json_logs());

        let mapping = config.column_mapping();
        assert_eq!(
            mapping.trip_duration_seconds,
            vec!["01 - Rental Details Duration In Seconds Uncapped"]
        );
        assert_eq!(mapping.start_time, vec!["start_time"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("TRIP_ANALYTICS_TEST_INPUT", "/mnt/divvy");

        let toml_content = r#"
[pipeline]
name = "test"
version = "1.0"

[source]
input_path = "${TRIP_ANALYTICS_TEST_INPUT}"

[load]
output_path = "${TRIP_ANALYTICS_TEST_UNSET}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.input_path(), "/mnt/divvy");
        assert_eq!(config.output_path(), "${TRIP_ANALYTICS_TEST_UNSET}");

        std::env::remove_var("TRIP_ANALYTICS_TEST_INPUT");
    }

    #[test]
    fn test_config_validation() {
        let toml_content = r#"
[pipeline]
name = "test"
version = "1.0"

[source]
input_path = ""

[load]
output_path = "./output"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_policy_is_a_parse_error() {
        let toml_content = MINIMAL.replace(
            "[load]",
            "[merge]\non_schema_mismatch = \"reconcile\"\n\n[load]",
        );

        let err = TomlConfig::from_toml_str(&toml_content).unwrap_err();
        assert!(matches!(err, EtlError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_empty_alias_list_is_invalid() {
        let toml_content = format!("{}\n[schema.columns]\nstart_time = []\n", MINIMAL);

        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.pipeline.name, "divvy-2019");
    }
}
