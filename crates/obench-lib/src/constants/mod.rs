//! Defaults and environment-driven configuration

pub mod env;

pub use env::{build_ollama_url, parse_port};

/// Host used when `OLLAMA_HOST` is unset or blank
pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1";
/// Port used when neither `OLLAMA_PORT` nor the host carries one
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;
/// Generation budget per call, large enough for reasoning models
pub const DEFAULT_NUM_PREDICT: u32 = 20000;
pub const DEFAULT_RUNS_PER_TEST: u32 = 5;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_API_PORT: u16 = 4567;
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 300;
