//! Streaming CSV reader
//!
//! Records are pulled lazily from the underlying byte source, so memory use is
//! bounded by a single record regardless of input size. The byte ceiling is
//! checked up front when the source length is known and again while reading.

use crate::error::{Result, StoreMetricsError};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// One data row in header order, tagged with its source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    pub line: u64,
    pub fields: Vec<String>,
}

/// A lazy sequence of CSV records the batch loader can drain
pub trait RecordSource {
    fn next_record(&mut self) -> Option<Result<CsvRecord>>;

    /// Bytes consumed from the source so far
    fn bytes_read(&self) -> u64 {
        0
    }

    /// Total source size, when known
    fn bytes_total(&self) -> Option<u64> {
        None
    }
}

/// Header-aware CSV reader over any byte source
pub struct CsvRecordReader<R: Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    record: csv::StringRecord,
    pending: Option<CsvRecord>,
    max_bytes: u64,
    bytes_total: Option<u64>,
    failed: bool,
}

impl CsvRecordReader<File> {
    /// Open a local file, rejecting it before any parsing if it exceeds
    /// `max_bytes`.
    pub fn from_path(path: &Path, max_bytes: u64) -> Result<Self> {
        let size = std::fs::metadata(path)?.len();
        if size > max_bytes {
            return Err(StoreMetricsError::PayloadTooLarge {
                limit: max_bytes,
                actual: size,
            });
        }
        let file = File::open(path)?;
        let mut reader = Self::new(file, max_bytes)?;
        reader.bytes_total = Some(size);
        Ok(reader)
    }
}

impl<R: Read> CsvRecordReader<R> {
    pub fn new(source: R, max_bytes: u64) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            // Arity is validated by the loader so a bad row fails its batch.
            .flexible(true)
            .from_reader(source);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 {
                    h.trim_start_matches('\u{feff}').to_string()
                } else {
                    h.to_string()
                }
            })
            .collect();

        if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
            return Err(StoreMetricsError::validation("CSV input has no header row"));
        }

        Ok(Self {
            reader,
            headers,
            record: csv::StringRecord::new(),
            pending: None,
            max_bytes,
            bytes_total: None,
            failed: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Look at the first data row without consuming it
    pub fn sample(&mut self) -> Result<Option<&CsvRecord>> {
        if self.pending.is_none() {
            match self.read_next() {
                Some(Ok(record)) => self.pending = Some(record),
                Some(Err(e)) => return Err(e),
                None => return Ok(None),
            }
        }
        Ok(self.pending.as_ref())
    }

    fn read_next(&mut self) -> Option<Result<CsvRecord>> {
        if self.failed {
            return None;
        }
        match self.reader.read_record(&mut self.record) {
            Ok(false) => return None,
            Ok(true) => {}
            Err(e) => {
                self.failed = true;
                return Some(Err(e.into()));
            }
        }

        let consumed = self.reader.position().byte();
        if consumed > self.max_bytes {
            self.failed = true;
            return Some(Err(StoreMetricsError::PayloadTooLarge {
                limit: self.max_bytes,
                actual: consumed,
            }));
        }

        // The csv reader already skips blank lines; a lone `""` is a real row
        let line = self
            .record
            .position()
            .map(|p| p.line())
            .unwrap_or_default();
        Some(Ok(CsvRecord {
            line,
            fields: self.record.iter().map(String::from).collect(),
        }))
    }
}

impl<R: Read> RecordSource for CsvRecordReader<R> {
    fn next_record(&mut self) -> Option<Result<CsvRecord>> {
        if let Some(record) = self.pending.take() {
            return Some(Ok(record));
        }
        self.read_next()
    }

    fn bytes_read(&self) -> u64 {
        self.reader.position().byte()
    }

    fn bytes_total(&self) -> Option<u64> {
        self.bytes_total
    }
}

impl<R: Read> Iterator for CsvRecordReader<R> {
    type Item = Result<CsvRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}

/// Adapter turning any record iterator into a [`RecordSource`]
pub struct IterRecords<I>(pub I);

impl<I> RecordSource for IterRecords<I>
where
    I: Iterator<Item = Result<CsvRecord>>,
{
    fn next_record(&mut self) -> Option<Result<CsvRecord>> {
        self.0.next()
    }
}
