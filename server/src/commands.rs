//! Command implementations for the storemetrics binary

use crate::cli::Commands;
use crate::output::PrettyPrinter;
use crate::progress::ImportProgress;
use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use storemetrics_core::config::ConfigSource;
use storemetrics_core::export::{export_query, export_to_path};
use storemetrics_core::{
    CancellationFlag, Config, Database, ExportOptions, IngestOptions, Ingestor, TypeMode,
};
use storemetrics_server::{build_router, AppState};

/// Execute a command
pub fn execute_command(command: Commands, config: Config, source: ConfigSource) -> Result<()> {
    match command {
        Commands::Serve { host, port } => serve_command(config, host, port),
        Commands::Import {
            input,
            batch_size,
            infer_types,
        } => import_command(config, &input, batch_size, infer_types),
        Commands::Export {
            file,
            query,
            no_header,
            delimiter,
            force,
        } => export_command(&config, &file, query.as_deref(), !no_header, delimiter, force),
        Commands::Status { json } => status_command(&config, &source, json),
        Commands::Cleanup { force } => cleanup_command(&config, force),
    }
}

fn open_database(config: &Config) -> Result<Database> {
    Database::open(&config.database.path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database.path.display()
        )
    })
}

/// Close the database once every other handle is gone
fn close_database(db: Arc<Database>) -> Result<()> {
    match Arc::try_unwrap(db) {
        Ok(db) => db.close().context("Failed to close database"),
        Err(_) => {
            log::warn!("Database still shared at shutdown; leaving it to drop");
            Ok(())
        }
    }
}

fn serve_command(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let db = Arc::new(open_database(&config)?);
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let app = build_router(AppState::new(Arc::clone(&db), config));
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        log::info!("Server running on http://{addr}");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
    })?;

    log::info!("Server stopped");
    close_database(db)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}

fn import_command(
    config: Config,
    input: &Path,
    batch_size: Option<usize>,
    infer_types: bool,
) -> Result<()> {
    let mut options = IngestOptions::from(&config.ingest);
    if let Some(batch_size) = batch_size {
        if batch_size == 0 {
            bail!("--batch-size must be at least 1");
        }
        options.batch_size = batch_size;
    }
    if infer_types {
        options.type_mode = TypeMode::Inferred;
    }

    let file_size = std::fs::metadata(input)
        .with_context(|| format!("Cannot read {}", input.display()))?
        .len();

    let db = Arc::new(open_database(&config)?);
    let ingestor = Ingestor::new(Arc::clone(&db), options);
    let mut progress = ImportProgress::new(file_size, "Importing");
    let summary = ingestor
        .ingest_path(input, &CancellationFlag::new(), |p| progress.update(p))
        .with_context(|| format!("Failed to import {}", input.display()))?;
    progress.finish("done");

    PrettyPrinter::print_import_summary(&summary);
    drop(ingestor);
    close_database(db)
}

fn export_command(
    config: &Config,
    file: &Path,
    query: Option<&str>,
    include_header: bool,
    delimiter: char,
    force: bool,
) -> Result<()> {
    if !delimiter.is_ascii() {
        bail!("Delimiter must be a single ASCII character");
    }
    let options = ExportOptions {
        include_header,
        delimiter: delimiter as u8,
        force,
    };

    let db = open_database(config)?;
    let written = export_to_path(&db.connection()?, export_query(query), file, &options)
        .with_context(|| format!("Failed to export to {}", file.display()))?;
    println!("✅ Exported {written} rows to {}", file.display());
    db.close()?;
    Ok(())
}

fn status_command(config: &Config, source: &ConfigSource, json: bool) -> Result<()> {
    let db = open_database(config)?;
    let status = db.status()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        PrettyPrinter::print_status(&status, config, source);
    }
    db.close()?;
    Ok(())
}

fn cleanup_command(config: &Config, force: bool) -> Result<()> {
    if !force && !confirm("Drop the store_metrics table and all its rows?")? {
        println!("Cleanup cancelled");
        return Ok(());
    }

    let db = open_database(config)?;
    db.drop_metrics_table()?;
    println!("✅ Database cleaned successfully");
    db.close()?;
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
