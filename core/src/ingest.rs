//! Ingestion pipeline
//!
//! Glues the CSV reader, schema inference and the batch loader together and
//! owns the single-upload guard. Only one ingestion may run at a time; a
//! second caller fails fast instead of queueing behind the first.

use crate::config::IngestConfig;
use crate::database::Database;
use crate::error::{Result, StoreMetricsError};
use crate::loader::{BatchLoader, CancellationFlag, LoadProgress};
use crate::reader::CsvRecordReader;
use crate::schema::{infer_schema, TypeMode};
use crate::METRICS_TABLE;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub max_upload_bytes: u64,
    pub type_mode: TypeMode,
    pub upload_dir: Option<PathBuf>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for IngestOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_upload_bytes: config.max_upload_bytes,
            type_mode: config.type_mode(),
            upload_dir: config.upload_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub rows_loaded: u64,
    pub total_rows: u64,
    pub columns: Vec<String>,
    pub batches: u64,
}

pub struct Ingestor {
    db: Arc<Database>,
    options: IngestOptions,
    guard: Mutex<()>,
}

impl Ingestor {
    pub fn new(db: Arc<Database>, options: IngestOptions) -> Self {
        Self {
            db,
            options,
            guard: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Whether an ingestion currently holds the guard
    pub fn is_busy(&self) -> bool {
        matches!(self.guard.try_lock(), Err(TryLockError::WouldBlock))
    }

    fn acquire(&self) -> Result<MutexGuard<'_, ()>> {
        match self.guard.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(StoreMetricsError::ConflictingIngestion),
            // A panicked ingestion leaves nothing behind worth protecting
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }

    /// Empty staging file for an upload, in `upload_dir` when configured.
    /// The file is deleted when the handle is dropped.
    pub fn staging_file(&self) -> Result<NamedTempFile> {
        let file = match &self.options.upload_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                tempfile::Builder::new()
                    .prefix("upload-")
                    .suffix(".csv")
                    .tempfile_in(dir)?
            }
            None => tempfile::Builder::new()
                .prefix("upload-")
                .suffix(".csv")
                .tempfile()?,
        };
        Ok(file)
    }

    /// Ingest a CSV file on disk, replacing the metrics table
    pub fn ingest_path<F>(
        &self,
        path: &Path,
        cancel: &CancellationFlag,
        on_progress: F,
    ) -> Result<IngestSummary>
    where
        F: FnMut(&LoadProgress),
    {
        let _guard = self.acquire()?;
        log::info!("Ingesting {}", path.display());
        let reader = CsvRecordReader::from_path(path, self.options.max_upload_bytes)?;
        self.run(reader, cancel, on_progress)
    }

    /// Ingest a staged upload. The staging file is removed whether or not
    /// the ingestion succeeds.
    pub fn ingest_upload<F>(
        &self,
        upload: NamedTempFile,
        cancel: &CancellationFlag,
        on_progress: F,
    ) -> Result<IngestSummary>
    where
        F: FnMut(&LoadProgress),
    {
        let result = self.ingest_path(upload.path(), cancel, on_progress);
        if let Err(e) = upload.close() {
            log::warn!("Failed to remove staged upload: {e}");
        }
        result
    }

    /// Ingest CSV from any byte source
    pub fn ingest_reader<R, F>(
        &self,
        source: R,
        cancel: &CancellationFlag,
        on_progress: F,
    ) -> Result<IngestSummary>
    where
        R: Read,
        F: FnMut(&LoadProgress),
    {
        let _guard = self.acquire()?;
        let reader = CsvRecordReader::new(source, self.options.max_upload_bytes)?;
        self.run(reader, cancel, on_progress)
    }

    fn run<R, F>(
        &self,
        mut reader: CsvRecordReader<R>,
        cancel: &CancellationFlag,
        on_progress: F,
    ) -> Result<IngestSummary>
    where
        R: Read,
        F: FnMut(&LoadProgress),
    {
        let headers = reader.headers().to_vec();
        let sample = match self.options.type_mode {
            TypeMode::Inferred => reader.sample()?.map(|record| record.fields.clone()),
            TypeMode::Text => None,
        };
        let spec = infer_schema(
            METRICS_TABLE,
            &headers,
            sample.as_deref(),
            self.options.type_mode,
        )?;
        log::debug!(
            "Inferred {} columns ({:?} mode)",
            spec.columns.len(),
            self.options.type_mode
        );

        let mut connection = self.db.connection()?;
        let loader = BatchLoader::new(self.options.batch_size);
        let summary = loader.load(
            &mut connection,
            &spec,
            &mut reader,
            cancel,
            on_progress,
        )?;

        log::info!(
            "Ingested {} rows into {} in {} batches",
            summary.rows_loaded,
            METRICS_TABLE,
            summary.batches_committed
        );
        Ok(IngestSummary {
            rows_loaded: summary.rows_loaded,
            total_rows: summary.rows_loaded,
            columns: spec.column_names(),
            batches: summary.batches_committed,
        })
    }
}
