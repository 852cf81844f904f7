use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use obench_db::{resolve_results_file, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// API state: where results files live and the lock serializing access to them
#[derive(Clone)]
pub struct ApiState {
    pub data_dir: Arc<PathBuf>,
    pub lock: Arc<Mutex<()>>,
}

impl ApiState {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Arc::new(data_dir.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Path of the results file selected by the query and, for appends, the body's run name.
    pub fn results_path(&self, query: &FileQuery, payload_run: Option<&str>) -> PathBuf {
        let name = resolve_results_file(query.file.as_deref(), query.run.as_deref(), payload_run);
        self.data_dir.join(name)
    }
}

/// `?file=` / `?run=` selection accepted by every results endpoint
#[derive(Debug, Default, Deserialize)]
pub struct FileQuery {
    pub file: Option<String>,
    pub run: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct AppendResponse {
    pub ok: bool,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid JSON")]
    InvalidJson,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::InvalidJson => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
