use crate::error::{Result, StoreMetricsError};
use crate::schema::TypeMode;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "STOREMETRICS_CONFIG";
pub const DB_PATH_ENV: &str = "STOREMETRICS_DB_PATH";
pub const PORT_ENV: &str = "PORT";
pub const LOCAL_CONFIG_FILE: &str = "storemetrics.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Rows per insert transaction
    pub batch_size: usize,
    pub max_upload_bytes: u64,
    pub upload_timeout_secs: u64,
    /// Type columns from the first data row instead of storing text
    pub infer_types: bool,
    /// Where uploads are staged; the system temp dir when unset
    pub upload_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data").join("store_metrics.duckdb"),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::DEFAULT_BATCH_SIZE,
            max_upload_bytes: crate::MAX_UPLOAD_BYTES,
            upload_timeout_secs: 600,
            infer_types: false,
            upload_dir: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 15 * 60,
        }
    }
}

impl IngestConfig {
    pub fn type_mode(&self) -> TypeMode {
        if self.infer_types {
            TypeMode::Inferred
        } else {
            TypeMode::Text
        }
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    EnvironmentVariable(PathBuf),
    CurrentDirectory(PathBuf),
    Global(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CommandLine(p) => write!(f, "--config ({})", p.display()),
            ConfigSource::EnvironmentVariable(p) => write!(f, "{CONFIG_ENV} ({})", p.display()),
            ConfigSource::CurrentDirectory(p) => write!(f, "local config ({})", p.display()),
            ConfigSource::Global(p) => write!(f, "global config ({})", p.display()),
            ConfigSource::Defaults => write!(f, "built-in defaults"),
        }
    }
}

/// `~/.storemetrics/config.toml`
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".storemetrics").join("config.toml"))
}

pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| {
        StoreMetricsError::config(format!("Failed to read {}: {e}", path.display()))
    })?;
    toml::from_str(&content).map_err(|e| {
        StoreMetricsError::config(format!("Invalid config file {}: {e}", path.display()))
    })
}

/// Locate and load the first config file present.
///
/// Priority (highest first):
/// 1. File named by `STOREMETRICS_CONFIG`
/// 2. `./storemetrics.toml`
/// 3. `~/.storemetrics/config.toml`
/// 4. Defaults
pub fn resolve_config() -> Result<(Config, ConfigSource)> {
    if let Ok(config_path) = env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        return Ok((
            load_config_file(&path)?,
            ConfigSource::EnvironmentVariable(path),
        ));
    }

    let local = env::current_dir()?.join(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Ok((load_config_file(&local)?, ConfigSource::CurrentDirectory(local)));
    }

    if let Some(global) = global_config_path().filter(|p| p.exists()) {
        return Ok((load_config_file(&global)?, ConfigSource::Global(global)));
    }

    Ok((Config::default(), ConfigSource::Defaults))
}

impl Config {
    /// Apply `PORT` and `STOREMETRICS_DB_PATH` from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(PORT_ENV).filter(|p| !p.trim().is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| StoreMetricsError::config(format!("Invalid {PORT_ENV}: {port}")))?;
        }
        if let Some(path) = lookup(DB_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            self.database.path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.batch_size == 0 {
            return Err(StoreMetricsError::config("ingest.batch_size must be at least 1"));
        }
        if self.ingest.max_upload_bytes == 0 {
            return Err(StoreMetricsError::config(
                "ingest.max_upload_bytes must be greater than 0",
            ));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(StoreMetricsError::config(
                "rate_limit.max_requests and rate_limit.window_secs must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| StoreMetricsError::config(format!("Failed to serialize config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(
            config.database.path,
            PathBuf::from("data").join("store_metrics.duckdb")
        );
        assert_eq!(config.ingest.batch_size, 1000);
        assert_eq!(config.ingest.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(config.ingest.upload_timeout_secs, 600);
        assert_eq!(config.ingest.type_mode(), TypeMode::Text);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window_secs, 900);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storemetrics.toml");
        fs::write(
            &path,
            r#"
[server]
port = 8080

[ingest]
batch_size = 250
infer_types = true
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.ingest.batch_size, 250);
        assert_eq!(config.ingest.type_mode(), TypeMode::Inferred);
        assert_eq!(config.rate_limit, RateLimitConfig::default());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[server]\nport = \"not a port\"").unwrap();
        assert!(matches!(
            load_config_file(&path),
            Err(StoreMetricsError::Config(_))
        ));
        assert!(matches!(
            load_config_file(&dir.path().join("missing.toml")),
            Err(StoreMetricsError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("PORT", "4000"), ("STOREMETRICS_DB_PATH", "/tmp/m.duckdb")]);
        let mut config = Config::default();
        config
            .apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.database.path, PathBuf::from("/tmp/m.duckdb"));

        let mut config = Config::default();
        let err = config
            .apply_overrides_from(|k| (k == "PORT").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, StoreMetricsError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = Config::default();
        config.ingest.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let parsed: Config = toml::from_str(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
