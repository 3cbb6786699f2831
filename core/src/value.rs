//! Tagged cell values shared by ingestion, queries and exports

use crate::error::{Result, StoreMetricsError};
use duckdb::types::{TimeUnit, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single row keyed by column name, in select order
pub type Row = IndexMap<String, CellValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Null,
}

impl CellValue {
    /// Convert a JSON scalar into a bindable value. Arrays and objects
    /// have no column representation and are rejected.
    pub fn from_json(key: &str, value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(CellValue::Null),
            serde_json::Value::Bool(b) => Ok(CellValue::Text(b.to_string())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(CellValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(CellValue::Real(f))
                } else {
                    Ok(CellValue::Text(n.to_string()))
                }
            }
            serde_json::Value::String(s) => Ok(CellValue::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Err(StoreMetricsError::validation(format!(
                    "Value for '{key}' must be a string, number, boolean or null"
                )))
            }
        }
    }

    pub fn to_duckdb(&self) -> Value {
        match self {
            CellValue::Text(s) => Value::Text(s.clone()),
            CellValue::Integer(i) => Value::BigInt(*i),
            CellValue::Real(f) => Value::Double(*f),
            CellValue::Boolean(b) => Value::Boolean(*b),
            CellValue::Null => Value::Null,
        }
    }

    /// Map a DuckDB result value onto the JSON-friendly variants
    pub fn from_duckdb(value: Value) -> Self {
        match value {
            Value::Null => CellValue::Null,
            Value::Boolean(b) => CellValue::Boolean(b),
            Value::TinyInt(i) => CellValue::Integer(i as i64),
            Value::SmallInt(i) => CellValue::Integer(i as i64),
            Value::Int(i) => CellValue::Integer(i as i64),
            Value::BigInt(i) => CellValue::Integer(i),
            Value::UTinyInt(i) => CellValue::Integer(i as i64),
            Value::USmallInt(i) => CellValue::Integer(i as i64),
            Value::UInt(i) => CellValue::Integer(i as i64),
            Value::UBigInt(i) => match i64::try_from(i) {
                Ok(v) => CellValue::Integer(v),
                Err(_) => CellValue::Text(i.to_string()),
            },
            Value::HugeInt(i) => match i64::try_from(i) {
                Ok(v) => CellValue::Integer(v),
                Err(_) => CellValue::Text(i.to_string()),
            },
            Value::Float(f) => CellValue::Real(f as f64),
            Value::Double(f) => CellValue::Real(f),
            Value::Decimal(d) => {
                let text = d.to_string();
                match text.parse::<f64>() {
                    Ok(f) => CellValue::Real(f),
                    Err(_) => CellValue::Text(text),
                }
            }
            Value::Text(s) => CellValue::Text(s),
            Value::Enum(s) => CellValue::Text(s),
            Value::Blob(b) => CellValue::Text(format!("<blob:{} bytes>", b.len())),
            Value::Date32(days) => {
                let date = chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
                    .and_then(|epoch| {
                        epoch.checked_add_signed(chrono::Duration::days(days as i64))
                    });
                match date {
                    Some(date) => CellValue::Text(date.format("%Y-%m-%d").to_string()),
                    None => CellValue::Text(days.to_string()),
                }
            }
            Value::Timestamp(unit, ts) => CellValue::Text(format_timestamp(unit, ts)),
            Value::Time64(TimeUnit::Microsecond, t) => {
                let total_seconds = t / 1_000_000;
                CellValue::Text(format!(
                    "{:02}:{:02}:{:02}",
                    total_seconds / 3600,
                    (total_seconds % 3600) / 60,
                    total_seconds % 60
                ))
            }
            other => CellValue::Text(format!("{other:?}")),
        }
    }

    /// Render for CSV output; NULL becomes an empty field
    pub fn to_field(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Real(f) => f.to_string(),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Null => String::new(),
        }
    }
}

fn format_timestamp(unit: TimeUnit, ts: i64) -> String {
    let micros = match unit {
        TimeUnit::Second => ts.saturating_mul(1_000_000),
        TimeUnit::Millisecond => ts.saturating_mul(1_000),
        TimeUnit::Microsecond => ts,
        TimeUnit::Nanosecond => ts / 1_000,
    };
    let seconds = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    match chrono::DateTime::from_timestamp(seconds, nanos) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(
            CellValue::from_json("a", &json!("5")).unwrap(),
            CellValue::Text("5".into())
        );
        assert_eq!(
            CellValue::from_json("a", &json!(5)).unwrap(),
            CellValue::Integer(5)
        );
        assert_eq!(
            CellValue::from_json("a", &json!(2.5)).unwrap(),
            CellValue::Real(2.5)
        );
        assert_eq!(
            CellValue::from_json("a", &json!(null)).unwrap(),
            CellValue::Null
        );
        assert!(CellValue::from_json("a", &json!([1, 2])).is_err());
        assert!(CellValue::from_json("a", &json!({"x": 1})).is_err());
    }

    #[test]
    fn test_serializes_untagged() {
        let mut row = Row::new();
        row.insert("store".into(), CellValue::Text("5".into()));
        row.insert("qty".into(), CellValue::Integer(3));
        row.insert("ratio".into(), CellValue::Real(1.5));
        row.insert("missing".into(), CellValue::Null);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"store":"5","qty":3,"ratio":1.5,"missing":null}"#);
    }

    #[test]
    fn test_duckdb_conversion() {
        assert_eq!(CellValue::from_duckdb(Value::Int(7)), CellValue::Integer(7));
        assert_eq!(
            CellValue::from_duckdb(Value::Date32(0)),
            CellValue::Text("1970-01-01".into())
        );
        assert_eq!(CellValue::Null.to_field(), "");
        assert_eq!(CellValue::Integer(42).to_field(), "42");
    }
}
