//! Batch loader
//!
//! Records are grouped into fixed-size batches and each batch is committed in
//! its own transaction. The target table is recreated before the first batch.
//! A failing row rolls back its whole batch and aborts the load; batches that
//! were already committed stay in place.

use crate::error::{Result, StoreMetricsError};
use crate::reader::{CsvRecord, RecordSource};
use crate::schema::TableSpec;
use duckdb::{Connection, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Shared flag polled between rows; raising it rolls back the current batch
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress reported after every committed batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadProgress {
    pub rows_processed: u64,
    /// Known once the source is exhausted
    pub total_rows: Option<u64>,
    pub bytes_read: u64,
    pub bytes_total: Option<u64>,
}

impl LoadProgress {
    /// Completion percentage, from row counts when final, otherwise from
    /// bytes consumed.
    pub fn percentage(&self) -> Option<f64> {
        if let Some(total) = self.total_rows {
            if total == 0 {
                return Some(100.0);
            }
            return Some(self.rows_processed as f64 / total as f64 * 100.0);
        }
        match self.bytes_total {
            Some(total) if total > 0 => {
                Some((self.bytes_read as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub rows_loaded: u64,
    pub batches_committed: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchLoader {
    batch_size: usize,
}

impl Default for BatchLoader {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Drop and recreate the target table in a single transaction
    pub fn recreate_table(&self, connection: &mut Connection, spec: &TableSpec) -> Result<()> {
        let tx = connection.transaction()?;
        tx.execute_batch(&spec.drop_table_sql())?;
        tx.execute_batch(&spec.create_table_sql())?;
        tx.commit()?;
        log::info!(
            "Recreated table {} with {} columns",
            spec.name,
            spec.columns.len()
        );
        Ok(())
    }

    /// Recreate the table and load every record from `source`
    pub fn load<S, F>(
        &self,
        connection: &mut Connection,
        spec: &TableSpec,
        source: &mut S,
        cancel: &CancellationFlag,
        mut on_progress: F,
    ) -> Result<LoadSummary>
    where
        S: RecordSource + ?Sized,
        F: FnMut(&LoadProgress),
    {
        self.recreate_table(connection, spec)?;

        let mut summary = LoadSummary {
            rows_loaded: 0,
            batches_committed: 0,
        };
        let mut batch: Vec<CsvRecord> = Vec::with_capacity(self.batch_size);
        let mut exhausted = false;

        while !exhausted {
            batch.clear();
            while batch.len() < self.batch_size {
                match source.next_record() {
                    Some(record) => batch.push(record?),
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }
            if batch.is_empty() {
                break;
            }

            self.commit_batch(connection, spec, &batch, cancel)?;
            summary.rows_loaded += batch.len() as u64;
            summary.batches_committed += 1;
            log::debug!(
                "Committed batch {} ({} rows total)",
                summary.batches_committed,
                summary.rows_loaded
            );

            let progress = LoadProgress {
                rows_processed: summary.rows_loaded,
                total_rows: exhausted.then_some(summary.rows_loaded),
                bytes_read: source.bytes_read(),
                bytes_total: source.bytes_total(),
            };
            if let Some(pct) = progress.percentage() {
                log::info!(
                    "Processed {} rows ({pct:.1}%)",
                    progress.rows_processed
                );
            }
            on_progress(&progress);
        }

        // A stream ending on a batch boundary has not reported its total yet
        if summary.rows_loaded % self.batch_size as u64 == 0 {
            on_progress(&LoadProgress {
                rows_processed: summary.rows_loaded,
                total_rows: Some(summary.rows_loaded),
                bytes_read: source.bytes_read(),
                bytes_total: source.bytes_total(),
            });
        }

        Ok(summary)
    }

    fn commit_batch(
        &self,
        connection: &mut Connection,
        spec: &TableSpec,
        batch: &[CsvRecord],
        cancel: &CancellationFlag,
    ) -> Result<()> {
        let tx = connection.transaction()?;
        match insert_batch(&tx, spec, batch, cancel) {
            Ok(()) => {
                tx.commit()?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::warn!("Rollback after failed batch also failed: {rollback_err}");
                }
                log::error!("Batch of {} rows rolled back: {e}", batch.len());
                Err(e)
            }
        }
    }
}

fn insert_batch(
    tx: &Transaction<'_>,
    spec: &TableSpec,
    batch: &[CsvRecord],
    cancel: &CancellationFlag,
) -> Result<()> {
    let mut stmt = tx.prepare(&spec.insert_sql())?;
    for record in batch {
        if cancel.is_cancelled() {
            return Err(StoreMetricsError::Cancelled);
        }
        if record.fields.len() != spec.columns.len() {
            return Err(StoreMetricsError::RowArity {
                line: record.line,
                expected: spec.columns.len(),
                found: record.fields.len(),
            });
        }
        let values = spec.bind_values(record.line, &record.fields)?;
        stmt.execute(duckdb::params_from_iter(values.iter()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::row_count;
    use crate::reader::IterRecords;
    use crate::schema::{infer_schema, TypeMode};

    fn spec(columns: &[&str]) -> TableSpec {
        let headers: Vec<String> = columns.iter().map(|s| s.to_string()).collect();
        infer_schema("store_metrics", &headers, None, TypeMode::Text).unwrap()
    }

    fn records(rows: &[&[&str]]) -> Vec<Result<CsvRecord>> {
        rows.iter()
            .enumerate()
            .map(|(i, fields)| {
                Ok(CsvRecord {
                    line: i as u64 + 2,
                    fields: fields.iter().map(|s| s.to_string()).collect(),
                })
            })
            .collect()
    }

    #[test]
    fn test_batches_and_progress() {
        let mut connection = Connection::open_in_memory().unwrap();
        let rows: Vec<Vec<String>> = (0..7).map(|i| vec![i.to_string(), "x".into()]).collect();
        let mut source = IterRecords(rows.into_iter().enumerate().map(|(i, fields)| {
            Ok(CsvRecord {
                line: i as u64 + 2,
                fields,
            })
        }));

        let mut reports = Vec::new();
        let summary = BatchLoader::new(3)
            .load(
                &mut connection,
                &spec(&["a", "b"]),
                &mut source,
                &CancellationFlag::new(),
                |p| reports.push(*p),
            )
            .unwrap();

        assert_eq!(summary.rows_loaded, 7);
        assert_eq!(summary.batches_committed, 3);
        assert_eq!(row_count(&connection, "store_metrics").unwrap(), 7);
        let processed: Vec<u64> = reports.iter().map(|p| p.rows_processed).collect();
        assert_eq!(processed, vec![3, 6, 7]);
        assert_eq!(reports.last().unwrap().total_rows, Some(7));
        assert_eq!(reports.last().unwrap().percentage(), Some(100.0));
    }

    #[test]
    fn test_exact_multiple_reports_total_once_more() {
        let mut connection = Connection::open_in_memory().unwrap();
        let mut source = IterRecords(records(&[&["1"], &["2"], &["3"], &["4"]]).into_iter());
        let mut reports = Vec::new();
        let summary = BatchLoader::new(2)
            .load(
                &mut connection,
                &spec(&["a"]),
                &mut source,
                &CancellationFlag::new(),
                |p| reports.push(*p),
            )
            .unwrap();
        assert_eq!(summary.batches_committed, 2);
        assert_eq!(reports.last().unwrap().total_rows, Some(4));
    }

    #[test]
    fn test_failed_row_rolls_back_batch() {
        let mut connection = Connection::open_in_memory().unwrap();
        let mut source = IterRecords(
            records(&[&["1", "a"], &["2", "b"], &["3", "c"], &["4"], &["5", "e"]]).into_iter(),
        );
        let err = BatchLoader::new(2)
            .load(
                &mut connection,
                &spec(&["a", "b"]),
                &mut source,
                &CancellationFlag::new(),
                |_| {},
            )
            .unwrap_err();

        assert!(matches!(
            err,
            StoreMetricsError::RowArity {
                line: 5,
                expected: 2,
                found: 1
            }
        ));
        // First batch committed, second rolled back entirely
        assert_eq!(row_count(&connection, "store_metrics").unwrap(), 2);
    }

    #[test]
    fn test_recreate_drops_previous_shape() {
        let mut connection = Connection::open_in_memory().unwrap();
        let loader = BatchLoader::new(10);
        let mut first = IterRecords(records(&[&["1", "2"]]).into_iter());
        loader
            .load(&mut connection, &spec(&["a", "b"]), &mut first, &CancellationFlag::new(), |_| {})
            .unwrap();

        let mut second = IterRecords(records(&[&["x"], &["y"]]).into_iter());
        loader
            .load(&mut connection, &spec(&["z"]), &mut second, &CancellationFlag::new(), |_| {})
            .unwrap();

        assert_eq!(
            crate::database::column_names(&connection, "store_metrics").unwrap(),
            vec!["z"]
        );
        assert_eq!(row_count(&connection, "store_metrics").unwrap(), 2);
    }

    #[test]
    fn test_cancelled_load_commits_nothing() {
        let mut connection = Connection::open_in_memory().unwrap();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let mut source = IterRecords(records(&[&["1"], &["2"]]).into_iter());
        let err = BatchLoader::new(10)
            .load(&mut connection, &spec(&["a"]), &mut source, &cancel, |_| {})
            .unwrap_err();
        assert!(matches!(err, StoreMetricsError::Cancelled));
        assert_eq!(row_count(&connection, "store_metrics").unwrap(), 0);
    }

    #[test]
    fn test_empty_source_creates_table() {
        let mut connection = Connection::open_in_memory().unwrap();
        let mut source = IterRecords(Vec::<Result<CsvRecord>>::new().into_iter());
        let mut reports = Vec::new();
        let summary = BatchLoader::default()
            .load(
                &mut connection,
                &spec(&["a"]),
                &mut source,
                &CancellationFlag::new(),
                |p| reports.push(*p),
            )
            .unwrap();
        assert_eq!(summary.rows_loaded, 0);
        assert_eq!(summary.batches_committed, 0);
        assert_eq!(reports.len(), 1);
        assert_eq!(row_count(&connection, "store_metrics").unwrap(), 0);
    }
}
