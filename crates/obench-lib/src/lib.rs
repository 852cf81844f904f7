//! # Obench core library
//!
//! Scoring, stats accumulation, test definitions, model metadata helpers and the
//! inference client used by the runner.

pub mod benchmark;
pub mod constants;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod ollama;
pub mod score;

pub use obench_types as types;
