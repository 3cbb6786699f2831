//! Command-line interface for storemetrics

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "storemetrics")]
#[command(about = "Batched CSV ingestion and query service for retail store metrics")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (overrides STOREMETRICS_CONFIG and the default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file path
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Load a CSV file into the metrics table, replacing its contents
    Import {
        /// CSV file to ingest
        input: PathBuf,

        /// Rows per insert transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Type columns from the first data row instead of storing text
        #[arg(long)]
        infer_types: bool,
    },

    /// Export query results to a CSV file
    Export {
        /// Output file path
        #[arg(long)]
        file: PathBuf,

        /// SQL query to export (defaults to the whole table)
        #[arg(long)]
        query: Option<String>,

        /// Omit the header row
        #[arg(long)]
        no_header: bool,

        /// Field delimiter
        #[arg(long, default_value = ",")]
        delimiter: char,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show database status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop the metrics table
    Cleanup {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}
