//! Shared handler state

use crate::error::ApiError;
use crate::rate_limit::RateLimiter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storemetrics_core::{Config, Database, IngestOptions, Ingestor};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub ingestor: Arc<Ingestor>,
    pub config: Arc<Config>,
    pub limiter: Arc<RateLimiter>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db: Arc<Database>, config: Config) -> Self {
        let ingestor = Ingestor::new(Arc::clone(&db), IngestOptions::from(&config.ingest));
        let limiter = RateLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_secs),
        );
        Self {
            db,
            ingestor: Arc::new(ingestor),
            config: Arc::new(config),
            limiter: Arc::new(limiter),
            started_at: Instant::now(),
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.config.ingest.upload_timeout_secs)
    }

    /// Run a database operation on the blocking pool
    pub async fn with_db<T, F>(&self, context: &'static str, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> storemetrics_core::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| ApiError::internal(format!("Database task failed: {e}")))?
            .map_err(|e| ApiError::from_core(e, context))
    }
}
