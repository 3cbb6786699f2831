//! Common test utilities and fixtures

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storemetrics_core::{Database, IngestOptions, Ingestor};
use tempfile::TempDir;

/// Test fixture paths and utilities
pub struct TestFixtures {
    pub fixtures_dir: PathBuf,
    pub data_dir: PathBuf,
    pub configs_dir: PathBuf,
}

impl TestFixtures {
    pub fn new() -> Self {
        let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");

        Self {
            data_dir: fixtures_dir.join("data"),
            configs_dir: fixtures_dir.join("configs"),
            fixtures_dir,
        }
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.configs_dir.join(name)
    }
}

/// File-backed database in a temporary directory, plus an ingestor over it
pub struct TestDatabase {
    pub temp_dir: TempDir,
    pub db: Arc<Database>,
    pub ingestor: Ingestor,
}

impl TestDatabase {
    pub fn new() -> Self {
        Self::with_options(IngestOptions::default())
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        Self::with_options(IngestOptions {
            batch_size,
            ..IngestOptions::default()
        })
    }

    pub fn with_options(options: IngestOptions) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("data").join("store_metrics.duckdb");
        let db = Arc::new(Database::open(&db_path).expect("Failed to open database"));
        let ingestor = Ingestor::new(Arc::clone(&db), options);
        Self {
            temp_dir,
            db,
            ingestor,
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a CSV file into the temp directory
    pub fn write_csv(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, content).expect("Failed to write CSV file");
        path
    }

    /// Copy a fixture data file into the temp directory
    pub fn copy_data_file(&self, data_file_name: &str) -> PathBuf {
        let source = TestFixtures::new().data_file(data_file_name);
        let target = self.temp_dir.path().join(data_file_name);
        fs::copy(&source, &target).expect("Failed to copy data file");
        target
    }

    /// Generate `rows` data rows of `a,b,c` content
    pub fn write_generated_csv(&self, name: &str, rows: usize) -> PathBuf {
        let mut content = String::from("a,b,c\n");
        for i in 0..rows {
            content.push_str(&format!("{i},item-{i},{}\n", i * 2));
        }
        self.write_csv(name, &content)
    }
}
