//! Model metadata helpers: parameter sizes, filtering and runtime placement.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use obench_types::{ModelSummary, RuntimeInfo};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::ollama::ProcessEntry;

/// Parses a parameter-count label such as `"7.6B"` or `"350M"` into billions.
pub fn parse_param_size(text: &str) -> Option<f64> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| {
            RegexBuilder::new(r"([0-9.]+)\s*([BM])")
                .case_insensitive(true)
                .build()
                .ok()
        })
        .as_ref()?;
    let captures = re.captures(text)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    match captures.get(2)?.as_str() {
        "B" | "b" => Some(value),
        "M" | "m" => Some(value / 1000.0),
        _ => None,
    }
}

/// User-chosen restrictions on which models take part in a run.
#[derive(Debug, Clone, Default)]
pub struct ModelFilter {
    /// Case-insensitive regular expression matched against the model name
    pub pattern: Option<String>,
    /// Inclusive lower bound on parameter count in billions
    pub min_size_b: Option<f64>,
    /// Inclusive upper bound on parameter count in billions
    pub max_size_b: Option<f64>,
    /// Models listed but skipped during runs
    pub excluded: BTreeSet<String>,
}

/// The models a filter selects, or why it could not select any.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Selected(Vec<ModelSummary>),
    InvalidPattern { pattern: String, error: String },
}

impl FilterOutcome {
    /// Selected models, empty when the pattern was invalid.
    pub fn models(&self) -> &[ModelSummary] {
        match self {
            FilterOutcome::Selected(models) => models,
            FilterOutcome::InvalidPattern { .. } => &[],
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, FilterOutcome::InvalidPattern { .. })
    }
}

impl ModelFilter {
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_size_range(mut self, min_size_b: Option<f64>, max_size_b: Option<f64>) -> Self {
        self.min_size_b = min_size_b;
        self.max_size_b = max_size_b;
        self
    }

    pub fn exclude(mut self, model: impl Into<String>) -> Self {
        self.excluded.insert(model.into());
        self
    }

    pub fn is_excluded(&self, model: &str) -> bool {
        self.excluded.contains(model)
    }

    /// Applies the name pattern and size bounds. Excluded models stay in the selection.
    pub fn apply(&self, models: &[ModelSummary]) -> FilterOutcome {
        let pattern = self
            .pattern
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        let regex = match pattern {
            Some(pattern) => match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(err) => {
                    return FilterOutcome::InvalidPattern {
                        pattern: pattern.to_string(),
                        error: err.to_string(),
                    }
                }
            },
            None => None,
        };

        let selected = models
            .iter()
            .filter(|model| regex.as_ref().is_none_or(|re| re.is_match(&model.name)))
            .filter(|model| self.size_in_range(model.size_b))
            .cloned()
            .collect();
        FilterOutcome::Selected(selected)
    }

    fn size_in_range(&self, size_b: Option<f64>) -> bool {
        if self.min_size_b.is_none() && self.max_size_b.is_none() {
            return true;
        }
        let Some(size) = size_b else {
            return false;
        };
        self.min_size_b.is_none_or(|min| size >= min) && self.max_size_b.is_none_or(|max| size <= max)
    }
}

/// Numeric metadata value for `suffix`.
///
/// Looks up `<general.architecture>.<suffix>` first, then falls back to the
/// lexicographically first key ending in `.<suffix>`.
pub fn model_info_number(info: &Map<String, Value>, suffix: &str) -> Option<u64> {
    let as_number = |value: &Value| -> Option<u64> {
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.round() as u64)
        })
    };

    if let Some(architecture) = info.get("general.architecture").and_then(Value::as_str) {
        if let Some(value) = info.get(&format!("{architecture}.{suffix}")).and_then(as_number) {
            return Some(value);
        }
    }

    let dotted = format!(".{suffix}");
    let mut keys: Vec<&String> = info.keys().filter(|k| k.ends_with(&dotted)).collect();
    keys.sort();
    keys.into_iter()
        .find_map(|key| info.get(key).and_then(as_number))
}

/// Maximum context and the rough fp16 KV cache size it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextEstimate {
    pub context_tokens: Option<u64>,
    pub context_bytes: Option<u64>,
}

/// `context * layers * kv_heads * (key_len + value_len) * 2` bytes.
pub fn estimate_context_bytes(info: &Map<String, Value>) -> ContextEstimate {
    let context_tokens = model_info_number(info, "context_length");
    let bytes = (|| {
        let context = context_tokens?;
        let layers = model_info_number(info, "block_count")?;
        let kv_heads = model_info_number(info, "attention.head_count_kv")?;
        let key = model_info_number(info, "attention.key_length")?;
        let value = model_info_number(info, "attention.value_length")?;
        context
            .checked_mul(layers)?
            .checked_mul(kv_heads)?
            .checked_mul(key.checked_add(value)?)?
            .checked_mul(2)
    })();
    ContextEstimate {
        context_tokens,
        context_bytes: bytes,
    }
}

/// CPU/GPU split for a loaded model. `None` when the model reports no memory.
pub fn runtime_usage(process: &ProcessEntry) -> Option<RuntimeInfo> {
    if process.size == 0 {
        return None;
    }
    let gpu_ratio = (process.size_vram as f64 / process.size as f64).min(1.0);
    let gpu_percent = gpu_ratio * 100.0;
    Some(RuntimeInfo {
        total_bytes: process.size,
        vram_bytes: process.size_vram,
        cpu_percent: 100.0 - gpu_percent,
        gpu_percent,
        context_length: process.context_length,
        context_tokens: None,
        context_bytes_estimated: None,
    })
}

/// Runtime info with the context estimate from `info` filled in.
pub fn runtime_info(process: &ProcessEntry, info: Option<&Map<String, Value>>) -> Option<RuntimeInfo> {
    let mut runtime = runtime_usage(process)?;
    if let Some(info) = info {
        let estimate = estimate_context_bytes(info);
        runtime.context_tokens = estimate.context_tokens;
        runtime.context_bytes_estimated = estimate.context_bytes;
    }
    Some(runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("7.6B", Some(7.6))]
    #[case("350M", Some(0.35))]
    #[case("8b", Some(8.0))]
    #[case("1.5 B", Some(1.5))]
    #[case("", None)]
    #[case("unknown", None)]
    fn test_parse_param_size(#[case] text: &str, #[case] expected: Option<f64>) {
        match (parse_param_size(text), expected) {
            (Some(a), Some(b)) => assert!((a - b).abs() < 1e-9, "{text}: {a} != {b}"),
            (a, b) => assert_eq!(a, b, "{text}"),
        }
    }

    fn summary(name: &str, size_b: Option<f64>) -> ModelSummary {
        ModelSummary {
            name: name.to_string(),
            parameter_size_text: String::new(),
            size_b,
            size_bytes: None,
        }
    }

    #[test]
    fn test_filter_by_pattern_and_size() {
        let models = vec![
            summary("llama3:8b", Some(8.0)),
            summary("Qwen2.5:0.5b", Some(0.5)),
            summary("mystery", None),
        ];

        let outcome = ModelFilter::default().with_pattern("qwen").apply(&models);
        assert_eq!(outcome.models().len(), 1);
        assert_eq!(outcome.models()[0].name, "Qwen2.5:0.5b");

        let outcome = ModelFilter::default()
            .with_size_range(Some(1.0), None)
            .apply(&models);
        let names: Vec<_> = outcome.models().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["llama3:8b"]);

        let outcome = ModelFilter::default().apply(&models);
        assert_eq!(outcome.models().len(), 3);
    }

    #[test]
    fn test_invalid_pattern_selects_nothing() {
        let outcome = ModelFilter::default()
            .with_pattern("llama(")
            .apply(&[summary("llama3", Some(8.0))]);
        assert!(outcome.is_invalid());
        assert!(outcome.models().is_empty());
    }

    #[test]
    fn test_model_info_prefers_architecture_prefix() {
        let info = json!({
            "general.architecture": "llama",
            "aaa.context_length": 1024,
            "llama.context_length": 8192,
        });
        let info = info.as_object().unwrap();
        assert_eq!(model_info_number(info, "context_length"), Some(8192));

        let info = json!({
            "zeta.block_count": 2,
            "alpha.block_count": 32,
        });
        assert_eq!(
            model_info_number(info.as_object().unwrap(), "block_count"),
            Some(32)
        );
    }

    #[test]
    fn test_estimate_context_bytes() {
        let info = json!({
            "general.architecture": "llama",
            "llama.context_length": 8192,
            "llama.block_count": 32,
            "llama.attention.head_count_kv": 8,
            "llama.attention.key_length": 128,
            "llama.attention.value_length": 128,
        });
        let estimate = estimate_context_bytes(info.as_object().unwrap());
        assert_eq!(estimate.context_tokens, Some(8192));
        assert_eq!(estimate.context_bytes, Some(8192 * 32 * 8 * 256 * 2));

        let partial = json!({"llama.context_length": 4096});
        let estimate = estimate_context_bytes(partial.as_object().unwrap());
        assert_eq!(estimate.context_tokens, Some(4096));
        assert_eq!(estimate.context_bytes, None);
    }

    #[test]
    fn test_runtime_usage_split() {
        let info = runtime_usage(&ProcessEntry {
            size: 1000,
            size_vram: 250,
            context_length: Some(4096),
        })
        .unwrap();
        assert_eq!(info.gpu_percent, 25.0);
        assert_eq!(info.cpu_percent, 75.0);

        let over = runtime_usage(&ProcessEntry {
            size: 1000,
            size_vram: 2000,
            context_length: None,
        })
        .unwrap();
        assert_eq!(over.gpu_percent, 100.0);
        assert_eq!(over.cpu_percent, 0.0);

        assert!(runtime_usage(&ProcessEntry {
            size: 0,
            size_vram: 0,
            context_length: None,
        })
        .is_none());
    }
}
