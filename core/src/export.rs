//! CSV export of arbitrary read queries
//!
//! `export_csv` streams rows from DuckDB straight into a `csv::Writer`
//! without collecting them first. Whether the output is buffered is up to
//! the writer the caller passes in.

use crate::error::{Result, StoreMetricsError};
use crate::query::DEFAULT_QUERY;
use crate::value::CellValue;
use duckdb::Connection;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Export options for customizing output
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Whether to write the column names as the first record
    pub include_header: bool,
    pub delimiter: u8,
    /// Whether to overwrite an existing output file
    pub force: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_header: true,
            delimiter: b',',
            force: false,
        }
    }
}

/// Query text for an export, falling back to the whole table
pub fn export_query(query: Option<&str>) -> &str {
    query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or(DEFAULT_QUERY)
}

/// Write the result of `sql` as CSV and return the number of data rows
pub fn export_csv<W: Write>(
    connection: &Connection,
    sql: &str,
    writer: W,
    options: &ExportOptions,
) -> Result<u64> {
    let mut stmt = connection.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let columns = rows
        .as_ref()
        .map(|s| s.column_names())
        .unwrap_or_default();

    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .from_writer(writer);
    if options.include_header {
        csv_writer.write_record(&columns)?;
    }

    let mut written = 0u64;
    let mut record = Vec::with_capacity(columns.len());
    while let Some(row) = rows.next()? {
        record.clear();
        for i in 0..columns.len() {
            let value: duckdb::types::Value = row.get(i)?;
            record.push(CellValue::from_duckdb(value).to_field());
        }
        csv_writer.write_record(&record)?;
        written += 1;
    }
    csv_writer.flush()?;

    log::debug!("Exported {written} rows");
    Ok(written)
}

/// Export to a file, refusing to overwrite unless `force` is set
pub fn export_to_path(
    connection: &Connection,
    sql: &str,
    output_path: &Path,
    options: &ExportOptions,
) -> Result<u64> {
    if output_path.exists() && !options.force {
        return Err(StoreMetricsError::validation(format!(
            "Output file already exists: {}. Use force option to overwrite.",
            output_path.display()
        )));
    }
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(output_path)?;
    let written = export_csv(connection, sql, BufWriter::new(file), options)?;
    log::info!("Exported {written} rows to {}", output_path.display());
    Ok(written)
}
