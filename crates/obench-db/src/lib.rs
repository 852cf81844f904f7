//! # Obench result log
//!
//! Append-only CSV storage for benchmark results. Each finished test writes one aggregate
//! row plus one row per case attempt; readers replay the file into the latest result per
//! (model, test).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use obench_db::{reduce_rows, CsvResultStore, ResultStore, ResultsConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ResultsConfig::new("data").with_run_name("nightly");
//!     let store = CsvResultStore::from_config(&config);
//!
//!     let rows = store.read_all_rows().await?;
//!     let latest = reduce_rows(&rows);
//!     println!("{} latest results", latest.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod reader;
pub mod store;
pub mod types;
pub mod writer;

pub use config::{
    list_results_files, resolve_results_file, sanitize_results_filename, slugify_run_name,
    ResultsConfig, DEFAULT_RESULTS_FILE,
};
pub use error::{Result, StoreError};
pub use reader::{
    parse_rows, parse_timestamp, read_rows, reduce_rows, summarize_log, LatestResults,
    LogSummary, TestColumn,
};
pub use store::{CsvResultStore, ResultStore};
pub use types::*;
pub use writer::{append_records, append_rows, clear_results, ensure_results_file, export_csv};

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
