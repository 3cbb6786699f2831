//! Database handle for the metrics table

use crate::error::{Result, StoreMetricsError};
use crate::query;
use crate::schema::quote_identifier;
use crate::value::Row;
use crate::METRICS_TABLE;
use duckdb::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Snapshot of database health reported to the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStatus {
    pub initialized: bool,
    pub table_exists: bool,
    pub row_count: u64,
    pub db_size_bytes: u64,
    #[serde(rename = "dbSizeMB")]
    pub db_size_mb: f64,
}

/// Owned handle to the embedded database.
///
/// Opened once at startup and shared by every component. Each operation gets
/// its own connection to the same database via [`Database::connection`].
pub struct Database {
    connection: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the database file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let connection = Connection::open(path)?;
        log::info!("Opened database at {}", path.display());
        Ok(Self {
            connection: Mutex::new(connection),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self {
            connection: Mutex::new(connection),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// New connection to the shared database
    pub fn connection(&self) -> Result<Connection> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| StoreMetricsError::storage("Database handle lock poisoned"))?;
        Ok(guard.try_clone()?)
    }

    pub fn table_exists(&self) -> Result<bool> {
        table_exists(&self.connection()?, METRICS_TABLE)
    }

    pub fn row_count(&self) -> Result<u64> {
        let connection = self.connection()?;
        if !table_exists(&connection, METRICS_TABLE)? {
            return Ok(0);
        }
        row_count(&connection, METRICS_TABLE)
    }

    /// Column descriptors of the metrics table; empty when it does not exist
    pub fn schema(&self) -> Result<Vec<Row>> {
        let connection = self.connection()?;
        let sql = format!(
            "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info('{}')",
            METRICS_TABLE
        );
        if !table_exists(&connection, METRICS_TABLE)? {
            return Ok(Vec::new());
        }
        Ok(query::fetch_rows(&connection, &sql)?.into_objects())
    }

    /// Size of the database file on disk (0 for in-memory databases)
    pub fn size_bytes(&self) -> u64 {
        self.path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub fn status(&self) -> Result<DbStatus> {
        let connection = self.connection()?;
        let exists = table_exists(&connection, METRICS_TABLE)?;
        let rows = if exists {
            row_count(&connection, METRICS_TABLE)?
        } else {
            0
        };
        let size = self.size_bytes();
        Ok(DbStatus {
            initialized: true,
            table_exists: exists,
            row_count: rows,
            db_size_bytes: size,
            db_size_mb: (size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        })
    }

    /// Drop the metrics table entirely
    pub fn drop_metrics_table(&self) -> Result<()> {
        let connection = self.connection()?;
        connection.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}",
            quote_identifier(METRICS_TABLE)
        ))?;
        log::info!("Dropped table {METRICS_TABLE}");
        Ok(())
    }

    /// Close the underlying connection, flushing pending writes
    pub fn close(self) -> Result<()> {
        let connection = self
            .connection
            .into_inner()
            .map_err(|_| StoreMetricsError::storage("Database handle lock poisoned"))?;
        connection.close().map_err(|(_, e)| StoreMetricsError::from(e))
    }
}

pub fn table_exists(connection: &Connection, table: &str) -> Result<bool> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'main' AND table_name = ?",
        duckdb::params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn row_count(connection: &Connection, table: &str) -> Result<u64> {
    let count: i64 = connection.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

/// Column names of `table` in declaration order
pub fn column_names(connection: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = connection.prepare(
        "SELECT column_name FROM information_schema.columns \
         WHERE table_schema = 'main' AND table_name = ? ORDER BY ordinal_position",
    )?;
    let names = stmt
        .query_map(duckdb::params![table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}
