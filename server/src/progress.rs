//! Progress reporting utilities

use indicatif::{ProgressBar, ProgressStyle};
use storemetrics_core::LoadProgress;

/// Byte-based progress bar for CSV imports
#[derive(Debug)]
pub struct ImportProgress {
    bar: Option<ProgressBar>,
}

impl ImportProgress {
    pub fn new(file_size: u64, message: &str) -> Self {
        Self {
            bar: Some(create_file_progress(file_size, message)),
        }
    }

    /// Update from a loader progress report
    pub fn update(&self, progress: &LoadProgress) {
        if let Some(bar) = &self.bar {
            bar.set_position(progress.bytes_read);
            bar.set_message(format!("{} rows", progress.rows_processed));
        }
    }

    pub fn finish(&mut self, message: &str) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message(message.to_string());
        }
    }
}

impl Drop for ImportProgress {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Create a simple progress bar for file operations
pub fn create_file_progress(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>7}/{total_bytes:7} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}
