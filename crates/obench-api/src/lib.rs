//! HTTP server for obench result files.
//!
//! Serves the same results files the runner writes locally, so runs on several machines
//! can append to one log and the results view can be fetched remotely.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod handlers;
pub mod types;

pub use types::ApiState;

use handlers::*;

/// Create API router with all endpoints
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_check))
        .route("/api/results", get(get_results).post(append_results))
        .route("/api/results.csv", get(results_csv))
        .route("/api/results-files", get(list_files))
        .route("/api/clear", post(clear))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
