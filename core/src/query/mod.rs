//! Query gateway for ad-hoc reads against the metrics table
//!
//! Caller-supplied SQL is executed as-is. This is a trust boundary: the
//! gateway is only safe behind an internal frontend, never as a public API.

use crate::database::{row_count, table_exists};
use crate::error::{Result, StoreMetricsError};
use crate::value::{CellValue, Row};
use crate::METRICS_TABLE;
use duckdb::Connection;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const DEFAULT_QUERY: &str = "SELECT * FROM store_metrics";
pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;

/// Column names plus positional rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub row_count: usize,
}

impl QueryResult {
    /// Rows as name-keyed objects in select order
    pub fn into_objects(self) -> Vec<Row> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            query: None,
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

fn default_page() -> u64 {
    DEFAULT_PAGE
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

/// One page of results; `total` is the unfiltered table size
#[derive(Debug, Clone, Serialize)]
pub struct QueryPage {
    pub data: Vec<Row>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

fn limit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\blimit\b").expect("valid limit pattern"))
}

/// Case-insensitive check for a LIMIT keyword anywhere in the query text
pub fn has_limit_clause(sql: &str) -> bool {
    limit_pattern().is_match(sql)
}

/// Append `LIMIT/OFFSET` for the requested page unless the query already
/// limits itself.
pub fn paginate(sql: &str, page: u64, limit: u64) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    if has_limit_clause(trimmed) {
        return trimmed.to_string();
    }
    let page = page.max(1);
    let limit = limit.max(1);
    let offset = (page - 1).saturating_mul(limit);
    format!("{trimmed} LIMIT {limit} OFFSET {offset}")
}

/// Run a paginated read against the metrics table
pub fn run_query(connection: &Connection, request: &QueryRequest) -> Result<QueryPage> {
    if !table_exists(connection, METRICS_TABLE)? {
        return Err(StoreMetricsError::TableNotFound(METRICS_TABLE.to_string()));
    }

    let total = row_count(connection, METRICS_TABLE)?;
    let sql = request
        .query
        .as_deref()
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(DEFAULT_QUERY);
    let page = request.page.max(1);
    let limit = request.limit.max(1);
    let final_sql = paginate(sql, page, limit);
    log::debug!("Executing query: {final_sql}");

    let data = fetch_rows(connection, &final_sql)?.into_objects();
    Ok(QueryPage {
        data,
        total,
        page,
        limit,
    })
}

/// Execute a read query and collect every row.
///
/// Column names come from the executed statement, so CTEs and arbitrary
/// projections are described correctly.
pub fn fetch_rows(connection: &Connection, sql: &str) -> Result<QueryResult> {
    let mut stmt = connection.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let columns = rows
        .as_ref()
        .map(|s| s.column_names())
        .unwrap_or_default();

    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            let value: duckdb::types::Value = row.get(i)?;
            values.push(CellValue::from_duckdb(value));
        }
        collected.push(values);
    }

    Ok(QueryResult {
        columns,
        row_count: collected.len(),
        rows: collected,
    })
}
