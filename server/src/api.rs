//! HTTP endpoints
//!
//! `/query`, `/cleanup` and `/download` execute caller-supplied SQL. They are
//! meant for a trusted internal dashboard and must not be exposed publicly.

use crate::error::ApiError;
use crate::rate_limit::limit_requests;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storemetrics_core::export::{export_csv, export_query};
use storemetrics_core::mutation::{self, Clause};
use storemetrics_core::{
    metrics, query, CancellationFlag, DbStatus, ExportOptions, QueryPage, QueryRequest, Row,
    StoreMetricsError,
};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tower_http::cors::{Any, CorsLayer};

// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub uptime: f64,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub row_count: u64,
    pub total_rows: u64,
}

#[derive(Debug, Deserialize)]
pub struct UrlUpload {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub filter: Clause,
    #[serde(default)]
    pub updates: Clause,
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedRows {
    pub affected_rows: usize,
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CountParams {
    pub filter: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub message: String,
    pub status: String,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = usize::try_from(state.config.ingest.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/query", post(run_query))
        .route("/update", post(update))
        .route("/download", get(download))
        .route("/cleanup", post(cleanup))
        .route("/schema", get(schema))
        .route("/count", get(count))
        .route("/store-metrics", get(store_metrics))
        .route("/db-status", get(db_status))
        .route("/db-cleanup", post(db_cleanup))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(state.clone(), limit_requests))
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        uptime: state.started_at.elapsed().as_secs_f64(),
        message: "OK".to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}

async fn upload(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<UploadResponse>, ApiError> {
    if state.ingestor.is_busy() {
        return Err(StoreMetricsError::ConflictingIngestion.into());
    }

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let staged = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        stage_multipart(&state, multipart).await?
    } else if content_type.starts_with("application/json") {
        let Json(body) = Json::<UrlUpload>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        stage_url(&state, &body.url).await?
    } else {
        return Err(ApiError::bad_request("No file uploaded"));
    };

    let cancel = CancellationFlag::new();
    let task_cancel = cancel.clone();
    let ingestor = Arc::clone(&state.ingestor);
    let task = tokio::task::spawn_blocking(move || {
        ingestor.ingest_upload(staged, &task_cancel, |_| {})
    });

    let timeout = state.upload_timeout();
    let summary = match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined
            .map_err(|e| ApiError::internal(format!("Ingestion task failed: {e}")))?
            .map_err(|e| ApiError::from_core(e, "Error processing file"))?,
        Err(_) => {
            // The loader rolls back its current batch once it sees the flag
            cancel.cancel();
            return Err(StoreMetricsError::Timeout {
                seconds: timeout.as_secs(),
            }
            .into());
        }
    };

    Ok(Json(UploadResponse {
        message: "File processed successfully".to_string(),
        row_count: summary.rows_loaded,
        total_rows: summary.total_rows,
    }))
}

fn too_large(limit: u64, actual: u64) -> ApiError {
    StoreMetricsError::PayloadTooLarge { limit, actual }.into()
}

fn staging_io_error(e: std::io::Error) -> ApiError {
    ApiError::internal(format!("Failed to stage upload: {e}"))
}

/// Stream the `file` field into a staging file, enforcing the byte ceiling
async fn stage_multipart(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<NamedTempFile, ApiError> {
    let limit = state.config.ingest.max_upload_bytes;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let staged = state.ingestor.staging_file()?;
        let mut out = tokio::fs::File::from_std(staged.reopen().map_err(staging_io_error)?);
        let mut written = 0u64;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::new(e.status(), e.body_text()))?
        {
            written += chunk.len() as u64;
            if written > limit {
                return Err(too_large(limit, written));
            }
            out.write_all(&chunk).await.map_err(staging_io_error)?;
        }
        out.flush().await.map_err(staging_io_error)?;
        log::info!("Staged upload of {written} bytes");
        return Ok(staged);
    }
    Err(ApiError::bad_request("No file uploaded"))
}

/// Download a remote CSV into a staging file
async fn stage_url(state: &AppState, url: &str) -> Result<NamedTempFile, ApiError> {
    let limit = state.config.ingest.max_upload_bytes;
    let response = reqwest::get(url)
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to fetch {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(ApiError::bad_request(format!(
            "Failed to fetch {url}: HTTP {}",
            response.status()
        )));
    }
    if let Some(length) = response.content_length() {
        if length > limit {
            return Err(too_large(limit, length));
        }
    }

    let staged = state.ingestor.staging_file()?;
    let mut out = tokio::fs::File::from_std(staged.reopen().map_err(staging_io_error)?);
    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ApiError::bad_request(format!("Failed to fetch {url}: {e}")))?;
        written += chunk.len() as u64;
        if written > limit {
            return Err(too_large(limit, written));
        }
        out.write_all(&chunk).await.map_err(staging_io_error)?;
    }
    out.flush().await.map_err(staging_io_error)?;
    log::info!("Fetched {written} bytes from {url}");
    Ok(staged)
}

async fn run_query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryPage>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let page = state
        .with_db("Error executing query", move |db| {
            query::run_query(&db.connection()?, &request)
        })
        .await?;
    Ok(Json(page))
}

async fn update(
    State(state): State<AppState>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<AffectedRows>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let affected_rows = state
        .with_db("Error updating rows", move |db| {
            mutation::update(&db.connection()?, &request.filter, &request.updates)
        })
        .await?;
    Ok(Json(AffectedRows { affected_rows }))
}

async fn download(
    State(state): State<AppState>,
    params: Result<Query<DownloadParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let csv = state
        .with_db("Error exporting data", move |db| {
            let sql = export_query(params.query.as_deref()).to_string();
            let mut buffer = Vec::new();
            export_csv(&db.connection()?, &sql, &mut buffer, &ExportOptions::default())?;
            Ok(buffer)
        })
        .await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=data.csv"),
        ],
        csv,
    )
        .into_response())
}

async fn cleanup(
    State(state): State<AppState>,
    body: Result<Json<CleanupRequest>, JsonRejection>,
) -> Result<Json<AffectedRows>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let affected_rows = state
        .with_db("Error running cleanup", move |db| {
            mutation::cleanup(&db.connection()?, &request.query)
        })
        .await?;
    Ok(Json(AffectedRows { affected_rows }))
}

async fn schema(State(state): State<AppState>) -> Result<Json<Vec<Row>>, ApiError> {
    let columns = state
        .with_db("Error reading schema", |db| db.schema())
        .await?;
    Ok(Json(columns))
}

async fn count(
    State(state): State<AppState>,
    params: Result<Query<CountParams>, QueryRejection>,
) -> Result<Json<CountResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let filter = match params.filter.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => match serde_json::from_str::<serde_json::Value>(raw)
            .map_err(|e| ApiError::bad_request(format!("Invalid filter JSON: {e}")))?
        {
            serde_json::Value::Object(map) => Some(map),
            _ => return Err(ApiError::bad_request("filter must be a JSON object")),
        },
        _ => None,
    };

    let count = state
        .with_db("Error counting rows", move |db| {
            mutation::count(&db.connection()?, filter.as_ref())
        })
        .await?;
    Ok(Json(CountResponse { count }))
}

async fn store_metrics(State(state): State<AppState>) -> Result<Json<Vec<Row>>, ApiError> {
    let rows = state
        .with_db("An error occurred while fetching store metrics.", |db| {
            metrics::store_metrics(&db.connection()?)
        })
        .await?;
    Ok(Json(rows))
}

async fn db_status(State(state): State<AppState>) -> Result<Json<DbStatus>, ApiError> {
    let status = state
        .with_db("Failed to check database status", |db| db.status())
        .await?;
    Ok(Json(status))
}

async fn db_cleanup(State(state): State<AppState>) -> Result<Json<CleanupResponse>, ApiError> {
    state
        .with_db("Failed to clean database", |db| db.drop_metrics_table())
        .await?;
    Ok(Json(CleanupResponse {
        message: "Database cleaned successfully".to_string(),
        status: "success".to_string(),
    }))
}
