use serde::{Deserialize, Serialize};

/// A model advertised by the inference daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    /// Model name including tag, e.g. `"qwen2.5:7b"`
    pub name: String,
    /// Free-form parameter count as reported, e.g. `"7.6B"`
    pub parameter_size_text: String,
    /// Parameter count in billions, when parseable
    pub size_b: Option<f64>,
    /// On-disk size in bytes
    pub size_bytes: Option<u64>,
}

/// Where a loaded model currently lives, as reported by the daemon's process list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    pub total_bytes: u64,
    pub vram_bytes: u64,
    pub cpu_percent: f64,
    pub gpu_percent: f64,
    pub context_length: Option<u64>,
    /// Maximum context length from the model's architecture metadata
    #[serde(default)]
    pub context_tokens: Option<u64>,
    /// Rough fp16 KV cache size at maximum context
    #[serde(default)]
    pub context_bytes_estimated: Option<u64>,
}
