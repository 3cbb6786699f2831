//! # storemetrics-core
//!
//! Core library for storemetrics: streams retail store-metric CSV files into
//! an embedded DuckDB table in transactional batches and serves the table
//! back through query, mutation, export and derived-metrics operations.
//!
//! This crate holds every domain component and can be used without the HTTP
//! layer (the server crate, tests, or other tooling).

pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod ingest;
pub mod loader;
pub mod metrics;
pub mod mutation;
pub mod query;
pub mod reader;
pub mod schema;
pub mod value;

// Re-export the most commonly used types for convenience
pub use config::Config;
pub use database::{Database, DbStatus};
pub use error::{ErrorKind, Result, StoreMetricsError};
pub use export::ExportOptions;
pub use ingest::{IngestOptions, IngestSummary, Ingestor};
pub use loader::{BatchLoader, CancellationFlag, LoadProgress, LoadSummary, DEFAULT_BATCH_SIZE};
pub use query::{QueryPage, QueryRequest, QueryResult};
pub use schema::{TableSpec, TypeMode};
pub use value::{CellValue, Row};

/// Name of the single dynamically-shaped metrics table
pub const METRICS_TABLE: &str = "store_metrics";

/// Upload ceiling in bytes (100 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
