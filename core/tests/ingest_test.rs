//! End-to-end ingestion tests against a file-backed database

use storemetrics_core::database::column_names;
use storemetrics_core::{
    CancellationFlag, IngestOptions, StoreMetricsError, TypeMode, METRICS_TABLE,
};

mod common;
use common::TestDatabase;

#[test]
fn test_upload_creates_table_from_header() {
    let test_db = TestDatabase::new();
    let csv = test_db.write_generated_csv("upload.csv", 25);

    let summary = test_db
        .ingestor
        .ingest_path(&csv, &CancellationFlag::new(), |_| {})
        .unwrap();

    assert_eq!(summary.rows_loaded, 25);
    assert_eq!(summary.total_rows, 25);
    assert_eq!(test_db.db.row_count().unwrap(), 25);
    assert_eq!(
        column_names(&test_db.db.connection().unwrap(), METRICS_TABLE).unwrap(),
        vec!["a", "b", "c"]
    );
}

#[test]
fn test_reupload_replaces_columns_and_rows() {
    let test_db = TestDatabase::new();
    let first = test_db.write_generated_csv("first.csv", 10);
    test_db
        .ingestor
        .ingest_path(&first, &CancellationFlag::new(), |_| {})
        .unwrap();

    let second = test_db.write_csv("second.csv", "x,y\n1,2\n3,4\n");
    test_db
        .ingestor
        .ingest_path(&second, &CancellationFlag::new(), |_| {})
        .unwrap();

    assert_eq!(test_db.db.row_count().unwrap(), 2);
    assert_eq!(
        column_names(&test_db.db.connection().unwrap(), METRICS_TABLE).unwrap(),
        vec!["x", "y"]
    );
}

#[test]
fn test_batch_count_is_ceiling_of_rows() {
    for (rows, batch_size, expected) in [(10, 3, 4), (9, 3, 3), (1, 1000, 1), (1000, 1000, 1)] {
        let test_db = TestDatabase::with_batch_size(batch_size);
        let csv = test_db.write_generated_csv("batches.csv", rows);
        let summary = test_db
            .ingestor
            .ingest_path(&csv, &CancellationFlag::new(), |_| {})
            .unwrap();
        assert_eq!(summary.batches, expected, "rows={rows} batch={batch_size}");
        assert_eq!(summary.rows_loaded, rows as u64);
    }
}

#[test]
fn test_bad_row_rolls_back_its_batch_only() {
    let test_db = TestDatabase::with_batch_size(3);
    // Line 6 (fifth data row) is short; it lives in the second batch
    let csv = test_db.write_csv(
        "bad.csv",
        "a,b,c\n1,1,1\n2,2,2\n3,3,3\n4,4,4\n5,5\n6,6,6\n7,7,7\n",
    );

    let err = test_db
        .ingestor
        .ingest_path(&csv, &CancellationFlag::new(), |_| {})
        .unwrap_err();

    match err {
        StoreMetricsError::RowArity {
            line,
            expected,
            found,
        } => {
            assert_eq!(line, 6);
            assert_eq!(expected, 3);
            assert_eq!(found, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(test_db.db.row_count().unwrap(), 3);
}

#[test]
fn test_progress_reports_reach_completion() {
    let test_db = TestDatabase::with_batch_size(4);
    let csv = test_db.write_generated_csv("progress.csv", 10);
    let mut reports = Vec::new();

    test_db
        .ingestor
        .ingest_path(&csv, &CancellationFlag::new(), |p| reports.push(*p))
        .unwrap();

    assert_eq!(reports.len(), 3);
    assert!(reports[0].total_rows.is_none());
    assert!(reports[0].bytes_total.is_some());
    let pct = reports[0].percentage().unwrap();
    assert!(pct > 0.0 && pct < 100.0);
    let last = reports.last().unwrap();
    assert_eq!(last.rows_processed, 10);
    assert_eq!(last.total_rows, Some(10));
}

#[test]
fn test_header_only_file_creates_empty_table() {
    let test_db = TestDatabase::new();
    let csv = test_db.write_csv("empty.csv", "a,b\n");
    let summary = test_db
        .ingestor
        .ingest_path(&csv, &CancellationFlag::new(), |_| {})
        .unwrap();
    assert_eq!(summary.rows_loaded, 0);
    assert!(test_db.db.table_exists().unwrap());
    assert_eq!(test_db.db.row_count().unwrap(), 0);
}

#[test]
fn test_oversize_upload_rejected() {
    let test_db = TestDatabase::with_options(IngestOptions {
        max_upload_bytes: 16,
        ..IngestOptions::default()
    });
    let csv = test_db.write_generated_csv("big.csv", 50);
    let err = test_db
        .ingestor
        .ingest_path(&csv, &CancellationFlag::new(), |_| {})
        .unwrap_err();
    assert!(matches!(err, StoreMetricsError::PayloadTooLarge { .. }));
    assert!(!test_db.db.table_exists().unwrap());
}

#[test]
fn test_inferred_mode_rejects_uncoercible_value() {
    let test_db = TestDatabase::with_options(IngestOptions {
        type_mode: TypeMode::Inferred,
        batch_size: 10,
        ..IngestOptions::default()
    });
    let csv = test_db.write_csv("typed.csv", "store,qty\n1,5\n2,lots\n");
    let err = test_db
        .ingestor
        .ingest_path(&csv, &CancellationFlag::new(), |_| {})
        .unwrap_err();
    assert!(matches!(err, StoreMetricsError::Coercion { line: 3, .. }));
    assert_eq!(test_db.db.row_count().unwrap(), 0);
}

#[test]
fn test_quoted_fields_and_bom() {
    let test_db = TestDatabase::new();
    let csv = test_db.write_csv(
        "quoted.csv",
        "\u{feff}store_number,city_name\n7,\"Rogers, AR\"\n8,\"Say \"\"hi\"\"\"\n",
    );
    test_db
        .ingestor
        .ingest_path(&csv, &CancellationFlag::new(), |_| {})
        .unwrap();
    assert_eq!(
        column_names(&test_db.db.connection().unwrap(), METRICS_TABLE).unwrap(),
        vec!["store_number", "city_name"]
    );
    let city: String = test_db
        .db
        .connection()
        .unwrap()
        .query_row(
            "SELECT city_name FROM store_metrics WHERE store_number = '8'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(city, "Say \"hi\"");
}

#[test]
fn test_ingest_with_options_from_config_file() {
    let fixture = common::TestFixtures::new().config_file("local.toml");
    let config = storemetrics_core::config::load_config_file(&fixture).unwrap();
    assert_eq!(config.server.port, 4100);

    let test_db = TestDatabase::with_options(IngestOptions::from(&config.ingest));
    let csv = test_db.copy_data_file("store_metrics_sample.csv");
    let summary = test_db
        .ingestor
        .ingest_path(&csv, &CancellationFlag::new(), |_| {})
        .unwrap();

    assert_eq!(summary.rows_loaded, 4);
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.columns.len(), 11);
}
