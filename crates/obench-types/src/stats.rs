use serde::{Deserialize, Serialize};

/// Token counts and timings reported by the inference daemon for one or more calls.
///
/// Every field is optional: the daemon omits them freely, and an absent value means
/// "unknown", never zero. Durations are in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub prompt_eval_count: Option<u64>,
    pub eval_count: Option<u64>,
    pub prompt_eval_duration: Option<u64>,
    pub eval_duration: Option<u64>,
    pub total_duration: Option<u64>,
    pub load_duration: Option<u64>,
}

impl Stats {
    /// Prompt processing throughput in tokens per second.
    pub fn prompt_tokens_per_second(&self) -> Option<f64> {
        tokens_per_second(self.prompt_eval_count, self.prompt_eval_duration)
    }

    /// Generation throughput in tokens per second.
    pub fn eval_tokens_per_second(&self) -> Option<f64> {
        tokens_per_second(self.eval_count, self.eval_duration)
    }

    pub fn is_empty(&self) -> bool {
        *self == Stats::default()
    }
}

/// `count / (duration_ns / 1e9)`, defined only when both operands are known and the
/// duration is positive.
pub fn tokens_per_second(count: Option<u64>, duration_ns: Option<u64>) -> Option<f64> {
    match (count, duration_ns) {
        (Some(count), Some(duration)) if duration > 0 => {
            let value = count as f64 / (duration as f64 / 1e9);
            value.is_finite().then_some(value)
        }
        _ => None,
    }
}
