// error.rs: error taxonomy for field cleaning, schema loading and record cleaning
use thiserror::Error;

/// Validation failure on a single raw value. Always propagated to the caller:
/// the value is corrupt or unexpected and needs investigation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid IPv4 address: {0:?}")]
    InvalidIpv4(String),

    #[error("Value {value:?} does not match pattern {pattern}")]
    PatternMismatch { value: String, pattern: String },

    #[error("Not an integer: {0:?}")]
    NotAnInteger(String),

    #[error("Not a number: {0:?}")]
    NotANumber(String),

    #[error("Expected text, got {0}")]
    NotText(&'static str),
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to read schema {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse schema JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown field type {field_type:?} for column {column:?}")]
    UnknownFieldType { column: String, field_type: String },

    #[error("Invalid step {0:?} in field type definition")]
    InvalidStep(String),

    #[error("Invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Column {column:?}: {source}")]
    Field {
        column: String,
        #[source]
        source: FormatError,
    },

    #[error("Invalid record JSON at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecordError {
    pub fn field(column: impl Into<String>, source: FormatError) -> Self {
        Self::Field { column: column.into(), source }
    }
}

#[derive(Error, Debug)]
pub enum GeoDbError {
    #[error("Failed to read geo table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse geo table JSON: {0}")]
    Json(#[from] serde_json::Error),
}
