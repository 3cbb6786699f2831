//! Mutation gateway: parameterized updates, filtered counts and the
//! free-form cleanup statement.

use crate::database::table_exists;
use crate::error::{Result, StoreMetricsError};
use crate::schema::quote_identifier;
use crate::value::CellValue;
use crate::METRICS_TABLE;
use duckdb::types::Value;
use duckdb::Connection;
use serde_json::Map;

/// Column name to JSON value, as sent by the dashboard
pub type Clause = Map<String, serde_json::Value>;

fn bind_clause(clause: &Clause, separator: &str) -> Result<(String, Vec<Value>)> {
    let mut parts = Vec::with_capacity(clause.len());
    let mut params = Vec::with_capacity(clause.len());
    for (column, value) in clause {
        parts.push(format!("{} = ?", quote_identifier(column)));
        params.push(CellValue::from_json(column, value)?.to_duckdb());
    }
    Ok((parts.join(separator), params))
}

/// Build `UPDATE ... SET ... WHERE ...` with every value bound as a
/// parameter. Both clauses must be non-empty.
pub fn build_update(filter: &Clause, updates: &Clause) -> Result<(String, Vec<Value>)> {
    if updates.is_empty() {
        return Err(StoreMetricsError::validation(
            "Update requires at least one column in 'updates'",
        ));
    }
    if filter.is_empty() {
        return Err(StoreMetricsError::validation(
            "Update requires at least one column in 'filter'",
        ));
    }

    let (set_clause, mut params) = bind_clause(updates, ", ")?;
    let (where_clause, filter_params) = bind_clause(filter, " AND ")?;
    params.extend(filter_params);

    let sql = format!(
        "UPDATE {} SET {set_clause} WHERE {where_clause}",
        quote_identifier(METRICS_TABLE)
    );
    Ok((sql, params))
}

/// Apply an update and return the number of affected rows
pub fn update(connection: &Connection, filter: &Clause, updates: &Clause) -> Result<usize> {
    let (sql, params) = build_update(filter, updates)?;
    log::debug!("Executing update: {sql}");
    let affected = connection.execute(&sql, duckdb::params_from_iter(params.iter()))?;
    log::info!("Updated {affected} rows in {METRICS_TABLE}");
    Ok(affected)
}

pub fn build_count(filter: Option<&Clause>) -> Result<(String, Vec<Value>)> {
    let mut sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(METRICS_TABLE));
    let mut params = Vec::new();
    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        let (where_clause, filter_params) = bind_clause(filter, " AND ")?;
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause);
        params = filter_params;
    }
    Ok((sql, params))
}

/// Count rows matching an optional equality filter
pub fn count(connection: &Connection, filter: Option<&Clause>) -> Result<u64> {
    if !table_exists(connection, METRICS_TABLE)? {
        return Err(StoreMetricsError::TableNotFound(METRICS_TABLE.to_string()));
    }
    let (sql, params) = build_count(filter)?;
    let count: i64 =
        connection.query_row(&sql, duckdb::params_from_iter(params.iter()), |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

/// Execute an arbitrary caller-supplied statement.
///
/// Same trust boundary as the query gateway: internal callers only.
pub fn cleanup(connection: &Connection, sql: &str) -> Result<usize> {
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(StoreMetricsError::validation("Cleanup requires a 'query'"));
    }
    log::warn!("Executing cleanup statement: {sql}");
    Ok(connection.execute(sql, [])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clause(value: serde_json::Value) -> Clause {
        value.as_object().cloned().unwrap()
    }

    fn seeded() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute_batch(
                "CREATE TABLE store_metrics (store_number VARCHAR, brand_name VARCHAR);
                 INSERT INTO store_metrics VALUES ('5', 'A'), ('5', 'B'), ('6', 'C');",
            )
            .unwrap();
        connection
    }

    #[test]
    fn test_build_update_binds_everything() {
        let (sql, params) = build_update(
            &clause(json!({"store_number": "5"})),
            &clause(json!({"brand_name": "X'); DROP TABLE store_metrics; --"})),
        )
        .unwrap();
        assert_eq!(
            sql,
            r#"UPDATE "store_metrics" SET "brand_name" = ? WHERE "store_number" = ?"#
        );
        assert_eq!(params.len(), 2);
        assert_eq!(params[1], Value::Text("5".into()));
    }

    #[test]
    fn test_empty_clauses_rejected() {
        let empty = Clause::new();
        let some = clause(json!({"a": "1"}));
        assert!(matches!(
            build_update(&empty, &some),
            Err(StoreMetricsError::Validation(_))
        ));
        assert!(matches!(
            build_update(&some, &empty),
            Err(StoreMetricsError::Validation(_))
        ));
    }

    #[test]
    fn test_update_affects_matching_rows() {
        let connection = seeded();
        let affected = update(
            &connection,
            &clause(json!({"store_number": "5"})),
            &clause(json!({"brand_name": "X"})),
        )
        .unwrap();
        assert_eq!(affected, 2);
        assert_eq!(
            count(&connection, Some(&clause(json!({"brand_name": "X"})))).unwrap(),
            2
        );
        assert_eq!(
            count(&connection, Some(&clause(json!({"store_number": "6", "brand_name": "C"}))))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_count_without_filter_and_missing_table() {
        let connection = seeded();
        assert_eq!(count(&connection, None).unwrap(), 3);

        let empty = Connection::open_in_memory().unwrap();
        assert!(matches!(
            count(&empty, None),
            Err(StoreMetricsError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_cleanup_runs_statement() {
        let connection = seeded();
        let affected = cleanup(
            &connection,
            "DELETE FROM store_metrics WHERE store_number = '6'",
        )
        .unwrap();
        assert_eq!(affected, 1);
        assert!(cleanup(&connection, "   ").is_err());
    }
}
