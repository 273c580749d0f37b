use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Corrupt archive '{archive}': {message}")]
    CorruptArchiveError { archive: String, message: String },

    #[error("Failed to decode '{entry}' in archive '{archive}' at line {line}: {message}")]
    DecodeError {
        archive: String,
        entry: String,
        line: u64,
        message: String,
    },

    #[error("Schema mismatch in table '{table}': expected {expected:?}, found {found:?}")]
    SchemaMismatchError {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Table '{table}' has no column for field '{field}'")]
    MissingColumnError { table: String, field: String },

    #[error("Invalid value '{value}' for '{field}' in table '{table}' at row {row}: {reason}")]
    InvalidFieldError {
        table: String,
        row: usize,
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to write result '{name}': {message}")]
    SinkError { name: String, message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Archive,
    Schema,
    Output,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Low still counts as success.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::CorruptArchiveError { .. } | EtlError::DecodeError { .. } => {
                ErrorCategory::Archive
            }
            EtlError::CsvError(_)
            | EtlError::SchemaMismatchError { .. }
            | EtlError::MissingColumnError { .. }
            | EtlError::InvalidFieldError { .. } => ErrorCategory::Schema,
            EtlError::SerializationError(_) | EtlError::SinkError { .. } => ErrorCategory::Output,
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            EtlError::IoError(_) | EtlError::ProcessingError { .. } => ErrorCategory::System,
        }
    }

    /// Archive-level failures only cost that archive's rows, so they rank
    /// below anything that stops the run.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::CorruptArchiveError { .. } | EtlError::DecodeError { .. } => {
                ErrorSeverity::Low
            }
            EtlError::SinkError { .. } | EtlError::IoError(_) => ErrorSeverity::Medium,
            EtlError::CsvError(_)
            | EtlError::SerializationError(_)
            | EtlError::SchemaMismatchError { .. }
            | EtlError::MissingColumnError { .. }
            | EtlError::InvalidFieldError { .. }
            | EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => ErrorSeverity::High,
            EtlError::ProcessingError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::CorruptArchiveError { .. } => {
                "Re-download the archive; the ZIP container could not be read".to_string()
            }
            EtlError::DecodeError { entry, .. } => {
                format!("Check that '{}' is UTF-8 encoded and well-formed CSV", entry)
            }
            EtlError::CsvError(_) => "Check the CSV structure of the input tables".to_string(),
            EtlError::SchemaMismatchError { .. } | EtlError::MissingColumnError { .. } => {
                "Map the header names under [schema.columns] or use --on-schema-mismatch drop"
                    .to_string()
            }
            EtlError::InvalidFieldError { field, .. } => {
                format!("Clean the '{}' column or drop the offending table", field)
            }
            EtlError::IoError(_) | EtlError::SinkError { .. } => {
                "Check that the input and output paths exist and are writable".to_string()
            }
            EtlError::SerializationError(_) => "Check the output format setting".to_string(),
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => {
                "Review the configuration file and command line flags".to_string()
            }
            EtlError::ProcessingError { .. } => "Re-run with --verbose and inspect the logs".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::CorruptArchiveError { archive, .. } => {
                format!("Archive '{}' is not a readable ZIP file", archive)
            }
            EtlError::DecodeError { archive, entry, .. } => {
                format!("Table '{}' in '{}' could not be decoded", entry, archive)
            }
            EtlError::SchemaMismatchError { table, .. } => {
                format!("Table '{}' does not match the dataset columns", table)
            }
            EtlError::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            other => other.to_string(),
        }
    }

    /// Logs the failure with its hint, prints the short form for the user
    /// and returns the process exit code for its severity.
    pub fn report(&self) -> i32 {
        tracing::error!(
            category = ?self.category(),
            severity = ?self.severity(),
            "❌ Run failed: {}",
            self
        );
        eprintln!("❌ {}", self.user_friendly_message());
        eprintln!("💡 {}", self.recovery_suggestion());
        self.severity().exit_code()
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
