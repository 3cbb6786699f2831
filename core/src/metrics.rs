//! Derived store metrics
//!
//! A fixed, read-only single-pass transformation of the raw metrics table
//! into the retail KPIs shown on the dashboard. Source values are coerced with
//! a total cast: NULL, empty or non-numeric text becomes 0. Source columns the
//! current table does not have are treated as NULL.

use crate::database::{column_names, row_count, table_exists};
use crate::error::{Result, StoreMetricsError};
use crate::query::fetch_rows;
use crate::schema::quote_identifier;
use crate::value::Row;
use crate::METRICS_TABLE;
use duckdb::Connection;
use std::collections::HashSet;

/// Maximum rows returned by the view
pub const MAX_METRIC_ROWS: usize = 1000;

/// Descriptive columns passed through as text
const TEXT_COLUMNS: &[&str] = &[
    "wm_time_window_week",
    "all_links_item_description",
    "all_links_item_number",
    "brand_id",
    "brand_name",
    "buyer_name",
    "consumer_id",
    "country_of_origin",
    "omni_category_group_description",
    "omni_department_number",
    "season_description",
    "season_year",
    "walmart_upc_number",
    "vendor_name",
    "vendor_number",
    "store_number",
    "city_name",
    "catalog_item_id",
];

const NUMERIC_COLUMNS: &[&str] = &[
    "base_unit_retail_amount",
    "dollar_per_str_with_sales_per_week_or_per_day_ty",
    "store_in_transit_quantity_this_year",
    "store_in_warehouse_quantity_this_year",
    "store_on_hand_quantity_this_year",
    "store_on_order_quantity_this_year",
    "pos_quantity_this_year",
    "units_per_str_with_sales_per_week_or_per_day_ty",
    "gross_receipt_quantity_this_year",
    "net_receipt_quantity_this_year",
    "total_store_customer_returns_quantity_defective_this_year",
    "instock_percentage_this_year",
    "repl_instock_percentage_this_year",
    "valid_store_count_this_year",
];

/// Output projection, in dashboard column order
const OUTPUT_SELECT: &str = r#"
    wm_time_window_week,
    all_links_item_description,
    all_links_item_number,
    base_unit_retail_amount,
    brand_id,
    brand_name,
    buyer_name,
    consumer_id,
    country_of_origin,
    omni_category_group_description,
    omni_department_number,
    season_description,
    season_year,
    walmart_upc_number,
    vendor_name,
    vendor_number,
    store_number,
    city_name,
    catalog_item_id,
    item_store_city AS "all_links_item_number/store_number/city_name",
    pos_quantity_this_year,
    ROUND(pos_quantity_this_year / 4.0, 2) AS l4w_pos_quantity_this_year,
    ROUND(pos_quantity_this_year / 52.0, 2) AS average_weekly_sales,
    units_per_str_with_sales_per_week_or_per_day_ty,
    ROUND(units_per_str_with_sales_per_week_or_per_day_ty / 4.0, 2) AS l4w_units_per_str_with_sales_per_week_or_per_day_ty,
    dollar_per_str_with_sales_per_week_or_per_day_ty,
    ROUND(dollar_per_str_with_sales_per_week_or_per_day_ty / 4.0, 2) AS l4w_dollar_per_str_with_sales_per_week_or_per_day_ty,
    gross_receipt_quantity_this_year,
    net_receipt_quantity_this_year,
    total_store_customer_returns_quantity_defective_this_year,
    instock_percentage_this_year,
    repl_instock_percentage_this_year,
    store_in_transit_quantity_this_year,
    store_in_warehouse_quantity_this_year,
    store_on_hand_quantity_this_year,
    store_on_order_quantity_this_year,
    valid_store_count_this_year,
    store_in_warehouse_quantity_this_year + store_in_transit_quantity_this_year AS pipeline_iw_it,
    wos_with_instore_pipeline,
    units_per_case_pack,
    case_packs,
    CASE
        WHEN case_packs > 0 AND wos_with_instore_pipeline > 0
        THEN case_packs * wos_with_instore_pipeline
        ELSE 0
    END AS total_units"#;

fn source(column: &str, existing: &HashSet<String>) -> String {
    if existing.contains(column) {
        format!("CAST({} AS VARCHAR)", quote_identifier(column))
    } else {
        "CAST(NULL AS VARCHAR)".to_string()
    }
}

fn numeric(column: &str, existing: &HashSet<String>) -> String {
    format!(
        "COALESCE(TRY_CAST({} AS DOUBLE), 0)",
        source(column, existing)
    )
}

/// Build the view query for a table holding `existing` columns
pub fn build_metrics_sql(existing: &HashSet<String>) -> String {
    let mut base = Vec::new();
    for column in TEXT_COLUMNS {
        base.push(format!(
            "COALESCE({}, '') AS {column}",
            source(column, existing)
        ));
    }
    for column in NUMERIC_COLUMNS {
        base.push(format!("{} AS {column}", numeric(column, existing)));
    }
    base.push(format!(
        "COALESCE({}, '') || '/' || COALESCE({}, '') || '/' || COALESCE({}, '') AS item_store_city",
        source("all_links_item_number", existing),
        source("store_number", existing),
        source("city_name", existing)
    ));
    base.push(format!(
        "CAST(TRUNC({}) AS BIGINT) AS case_packs",
        numeric("case_packs", existing)
    ));
    let description = source("all_links_item_description", existing);
    base.push(format!(
        "CASE WHEN COALESCE({description}, '') LIKE 'MS%' THEN 6 \
         WHEN COALESCE({description}, '') LIKE 'BHG%' THEN 5 \
         ELSE 0 END AS units_per_case_pack"
    ));

    format!(
        "WITH base_data AS (\n    SELECT\n        {}\n    FROM {}\n),\n\
         with_supply AS (\n    SELECT *,\n        CASE\n            WHEN pos_quantity_this_year / 4.0 > 0 THEN\n                ROUND((store_on_hand_quantity_this_year + store_in_warehouse_quantity_this_year + store_in_transit_quantity_this_year)\n                    / (pos_quantity_this_year / 4.0), 2)\n            ELSE 0\n        END AS wos_with_instore_pipeline\n    FROM base_data\n)\n\
         SELECT {OUTPUT_SELECT}\nFROM with_supply\nORDER BY store_number, all_links_item_number\nLIMIT {MAX_METRIC_ROWS}",
        base.join(",\n        "),
        quote_identifier(METRICS_TABLE)
    )
}

/// Compute the derived metrics rows
pub fn store_metrics(connection: &Connection) -> Result<Vec<Row>> {
    if !table_exists(connection, METRICS_TABLE)? || row_count(connection, METRICS_TABLE)? == 0 {
        return Err(StoreMetricsError::not_found(
            "No data available. Please upload a CSV file to view store metrics.",
        ));
    }

    let existing: HashSet<String> = column_names(connection, METRICS_TABLE)?
        .into_iter()
        .collect();
    log::debug!("Building store metrics over {} columns", existing.len());

    let rows = fetch_rows(connection, &build_metrics_sql(&existing))?.into_objects();
    log::info!("Store metrics query returned {} rows", rows.len());
    if rows.is_empty() {
        return Err(StoreMetricsError::not_found(
            "No data found. Please upload a CSV file with data.",
        ));
    }
    Ok(rows)
}
