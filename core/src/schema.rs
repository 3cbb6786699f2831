//! Schema inference for the metrics table
//!
//! The table shape is derived entirely from the header row of the CSV being
//! ingested. Column storage types are either all text, or inferred from the
//! first data row.

use crate::error::{Result, StoreMetricsError};
use duckdb::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Storage type of a metrics table column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    /// DuckDB type used in the generated DDL
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "VARCHAR",
            ColumnType::Integer => "BIGINT",
            ColumnType::Real => "DOUBLE",
        }
    }

    /// Integer if the value parses fully as base-10, else real if it parses
    /// as a finite float, else text.
    pub fn classify(value: &str) -> Self {
        if value.parse::<i64>().is_ok() {
            ColumnType::Integer
        } else if value.parse::<f64>().map(|f| f.is_finite()).unwrap_or(false) {
            ColumnType::Real
        } else {
            ColumnType::Text
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Real => "real number",
        }
    }
}

/// How column types are chosen at table creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeMode {
    /// Every column is stored as text
    #[default]
    Text,
    /// Types come from the first data row
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

/// Table name plus ordered column set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

/// Quote an identifier for DuckDB, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Build the table spec from a header row and an optional first data row.
pub fn infer_schema(
    table: &str,
    headers: &[String],
    sample: Option<&[String]>,
    mode: TypeMode,
) -> Result<TableSpec> {
    if headers.is_empty() {
        return Err(StoreMetricsError::validation("CSV input has no header row"));
    }

    let mut seen = HashSet::with_capacity(headers.len());
    for name in headers {
        if name.is_empty() {
            return Err(StoreMetricsError::validation(
                "CSV header contains an empty column name",
            ));
        }
        // DuckDB identifiers are case-insensitive even when quoted
        if !seen.insert(name.to_lowercase()) {
            return Err(StoreMetricsError::DuplicateColumn(name.clone()));
        }
    }

    let columns = headers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let column_type = match (mode, sample) {
                (TypeMode::Inferred, Some(row)) => row
                    .get(i)
                    .filter(|v| !v.is_empty())
                    .map(|v| ColumnType::classify(v))
                    .unwrap_or(ColumnType::Text),
                _ => ColumnType::Text,
            };
            ColumnSpec {
                name: name.clone(),
                column_type,
            }
        })
        .collect();

    Ok(TableSpec {
        name: table.to_string(),
        columns,
    })
}

impl TableSpec {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_identifier(&self.name))
    }

    pub fn create_table_sql(&self) -> String {
        let column_defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(&c.name), c.column_type.sql_type()))
            .collect();
        format!(
            "CREATE TABLE {} ({})",
            quote_identifier(&self.name),
            column_defs.join(", ")
        )
    }

    pub fn insert_sql(&self) -> String {
        let names: Vec<String> = self
            .columns
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect();
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&self.name),
            names.join(", "),
            placeholders
        )
    }

    /// Convert raw CSV fields into bind values for the declared column types.
    /// Callers must have checked arity.
    pub fn bind_values(&self, line: u64, fields: &[String]) -> Result<Vec<Value>> {
        self.columns
            .iter()
            .zip(fields)
            .map(|(column, raw)| coerce(line, column, raw))
            .collect()
    }
}

fn coerce(line: u64, column: &ColumnSpec, raw: &str) -> Result<Value> {
    match column.column_type {
        ColumnType::Text => Ok(Value::Text(raw.to_string())),
        _ if raw.is_empty() => Ok(Value::Null),
        ColumnType::Integer => raw
            .parse::<i64>()
            .map(Value::BigInt)
            .map_err(|_| coercion_error(line, column, raw)),
        ColumnType::Real => raw
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| coercion_error(line, column, raw)),
    }
}

fn coercion_error(line: u64, column: &ColumnSpec, raw: &str) -> StoreMetricsError {
    StoreMetricsError::Coercion {
        line,
        column: column.name.clone(),
        value: raw.to_string(),
        expected: column.column_type.describe(),
    }
}
