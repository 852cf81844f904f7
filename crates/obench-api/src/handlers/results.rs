//! Results file endpoints: append, latest view, raw CSV, clear, list

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use obench_db::{
    append_records, clear_results, export_csv, list_results_files, read_rows, reduce_rows,
    ResultsPayload, HEADERS,
};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::types::{ApiError, ApiState, AppendResponse, FileQuery, FilesResponse, OkResponse};

/// Runs blocking file work while holding the state's lock.
async fn with_files<T, F>(state: &ApiState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> obench_db::Result<T> + Send + 'static,
{
    let _guard = state.lock.lock().await;
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Task(e.to_string()))?
        .map_err(ApiError::from)
}

/// A JSON value as a CSV field: strings verbatim, null as empty, anything else as JSON text.
pub fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// One entry object as a record in header order; unknown keys are ignored.
pub fn record_from_entry(entry: &Value) -> Vec<String> {
    HEADERS
        .iter()
        .map(|header| field_text(entry.get(*header)))
        .collect()
}

/// The entries of an append body: `entries`, or a single `entry` when that is absent or empty.
pub fn entries_of(payload: &Value) -> Vec<&Value> {
    let entries: Vec<&Value> = payload
        .get("entries")
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
        .unwrap_or_default();
    if !entries.is_empty() {
        return entries;
    }
    payload
        .get("entry")
        .filter(|entry| !entry.is_null())
        .into_iter()
        .collect()
}

/// GET /api/results
pub async fn get_results(
    State(state): State<ApiState>,
    Query(query): Query<FileQuery>,
) -> Result<Json<ResultsPayload>, ApiError> {
    let path = state.results_path(&query, None);
    debug!(path = %path.display(), "Loading latest results");
    let rows = with_files(&state, move || read_rows(&path)).await?;
    Ok(Json(reduce_rows(&rows).to_payload()))
}

/// POST /api/results
pub async fn append_results(
    State(state): State<ApiState>,
    Query(query): Query<FileQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::InvalidJson)?
    };

    let records: Vec<Vec<String>> = entries_of(&payload)
        .into_iter()
        .map(record_from_entry)
        .collect();
    let count = records.len();
    if count > 0 {
        let run_name = payload.get("runName").and_then(Value::as_str);
        let path = state.results_path(&query, run_name);
        info!(path = %path.display(), rows = count, "Appending results");
        with_files(&state, move || append_records(&path, &records)).await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(AppendResponse { ok: true, count }),
    ))
}

/// POST /api/clear
pub async fn clear(
    State(state): State<ApiState>,
    Query(query): Query<FileQuery>,
) -> Result<Json<OkResponse>, ApiError> {
    let path = state.results_path(&query, None);
    with_files(&state, move || clear_results(&path)).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// GET /api/results.csv
pub async fn results_csv(
    State(state): State<ApiState>,
    Query(query): Query<FileQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let path = state.results_path(&query, None);
    let text = with_files(&state, move || export_csv(&path)).await?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], text))
}

/// GET /api/results-files
pub async fn list_files(State(state): State<ApiState>) -> Result<Json<FilesResponse>, ApiError> {
    let dir = state.data_dir.as_ref().clone();
    let files = with_files(&state, move || {
        list_results_files(&dir)
            .map_err(|e| obench_db::StoreError::filesystem(dir.display().to_string(), e))
    })
    .await?;
    Ok(Json(FilesResponse { files }))
}
