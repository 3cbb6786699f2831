//! Error types for storemetrics

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, StoreMetricsError>;

/// Coarse classification used by callers that translate errors into
/// transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Timeout,
    Storage,
}

#[derive(Debug, Error)]
pub enum StoreMetricsError {
    #[error("{0}")]
    Validation(String),

    #[error("Input of {actual} bytes exceeds the {limit} byte upload limit")]
    PayloadTooLarge { limit: u64, actual: u64 },

    #[error("Duplicate column name in header: {0}")]
    DuplicateColumn(String),

    #[error("Row at line {line} has {found} fields, expected {expected}")]
    RowArity {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("Value '{value}' in column '{column}' (line {line}) is not a valid {expected}")]
    Coercion {
        line: u64,
        column: String,
        value: String,
        expected: &'static str,
    },

    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Another ingestion is already in progress")]
    ConflictingIngestion,

    #[error("Ingestion cancelled")]
    Cancelled,

    #[error("Ingestion did not finish within {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreMetricsError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_)
            | Self::PayloadTooLarge { .. }
            | Self::DuplicateColumn(_)
            | Self::Json(_) => ErrorKind::Validation,
            Self::TableNotFound(_) | Self::NotFound(_) => ErrorKind::NotFound,
            Self::ConflictingIngestion => ErrorKind::Conflict,
            Self::Timeout { .. } | Self::Cancelled => ErrorKind::Timeout,
            // Malformed rows abort the load like any other storage failure.
            Self::RowArity { .. }
            | Self::Coercion { .. }
            | Self::Config(_)
            | Self::Storage(_)
            | Self::DuckDb(_)
            | Self::Csv(_)
            | Self::Io(_) => ErrorKind::Storage,
        }
    }
}
