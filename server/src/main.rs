//! Main entry point for the storemetrics binary

use anyhow::Result;
use clap::Parser;
use storemetrics_core::config::{self, load_config_file, ConfigSource};
use storemetrics_core::Config;

mod cli;
mod commands;
mod output;
mod progress;

use cli::Cli;
use commands::execute_command;

fn main() {
    // Load environment variables from .env file if present
    if std::path::Path::new(".env").exists() {
        if let Err(e) = dotenv::dotenv() {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();

    // RUST_LOG still wins over the default level
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let (config, source) = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = execute_command(cli.command, config, source) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Config file, then environment overrides, then command-line flags
fn load_settings(cli: &Cli) -> Result<(Config, ConfigSource)> {
    let (mut config, source) = match &cli.config {
        Some(path) => (load_config_file(path)?, ConfigSource::CommandLine(path.clone())),
        None => config::resolve_config()?,
    };
    config.apply_env_overrides()?;
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    config.validate()?;
    log::debug!("Loaded configuration from {source}");
    Ok((config, source))
}
