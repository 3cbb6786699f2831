//! Output formatting utilities

use storemetrics_core::config::ConfigSource;
use storemetrics_core::{Config, DbStatus, IngestSummary};

/// Pretty printer for storemetrics output
pub struct PrettyPrinter;

impl PrettyPrinter {
    pub fn print_status(status: &DbStatus, config: &Config, source: &ConfigSource) {
        println!("📊 Store Metrics Database");
        println!("├─ Path: {}", config.database.path.display());
        println!("├─ Config: {source}");
        println!(
            "├─ Table: {}",
            if status.table_exists {
                "store_metrics"
            } else {
                "(not created)"
            }
        );
        println!("├─ Rows: {}", status.row_count);
        println!("└─ Size: {}", format_bytes(status.db_size_bytes));
    }

    pub fn print_import_summary(summary: &IngestSummary) {
        println!("✅ Imported {} rows", summary.rows_loaded);
        println!("├─ Batches: {}", summary.batches);
        println!("└─ Columns ({}):", summary.columns.len());
        for (i, column) in summary.columns.iter().enumerate() {
            let prefix = if i == summary.columns.len() - 1 {
                "   └─"
            } else {
                "   ├─"
            };
            println!("{prefix} {column}");
        }
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(100 * 1024 * 1024), "100.0 MB");
    }
}
