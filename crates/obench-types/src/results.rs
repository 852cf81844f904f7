use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::Stats;

/// Points available for a single case attempt: one for containing the answer,
/// one for answering with nothing but the answer.
pub const CASE_MAX_SCORE: u32 = 2;

/// One evaluation of one case in one repeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Case id with the 1-based repeat suffix, e.g. `"3+2 #2"`
    pub case_id: String,
    /// Prompt that was sent
    pub prompt: String,
    /// Expected answer
    pub expected: String,
    /// Points earned, 0..=2
    pub score: u32,
    /// Always [`CASE_MAX_SCORE`]
    pub max_score: u32,
    /// Trimmed model output, empty on failure
    pub output: String,
    /// Failure description when the model call failed
    pub error: Option<String>,
    /// When the attempt finished
    pub completed_at: DateTime<Utc>,
    /// Stats reported for this single call
    pub stats: Stats,
}

impl CaseResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_perfect(&self) -> bool {
        self.score == self.max_score
    }
}

/// Aggregate result for one (model, test) pair across all repeats and cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Sum of all case scores
    pub score: u32,
    /// Maximum score of the definition this result was produced for
    pub max_score: u32,
    /// Human-readable per-case summary
    pub output: String,
    /// When the test finished
    pub completed_at: DateTime<Utc>,
    /// Every case attempt, in execution order
    pub case_results: Vec<CaseResult>,
    /// Ratio-of-sums totals over every successful call
    pub stats: Stats,
    /// Mean of per-repeat prompt throughput
    pub avg_prompt_tokens_per_second: Option<f64>,
    /// Mean of per-repeat generation throughput
    pub avg_eval_tokens_per_second: Option<f64>,
    /// Set only when the whole test could not be run
    pub error: Option<String>,
}

impl TestResult {
    /// A result standing in for a test that failed as a whole.
    pub fn failed(max_score: u32, error: impl Into<String>, completed_at: DateTime<Utc>) -> Self {
        Self {
            score: 0,
            max_score,
            output: String::new(),
            completed_at,
            case_results: Vec::new(),
            stats: Stats::default(),
            avg_prompt_tokens_per_second: None,
            avg_eval_tokens_per_second: None,
            error: Some(error.into()),
        }
    }

    /// Prompt throughput shown to users: the per-repeat mean when known, else ratio-of-sums.
    pub fn prompt_tokens_per_second(&self) -> Option<f64> {
        self.avg_prompt_tokens_per_second
            .filter(|v| *v > 0.0)
            .or_else(|| self.stats.prompt_tokens_per_second())
    }

    /// Generation throughput shown to users: the per-repeat mean when known, else ratio-of-sums.
    pub fn eval_tokens_per_second(&self) -> Option<f64> {
        self.avg_eval_tokens_per_second
            .filter(|v| *v > 0.0)
            .or_else(|| self.stats.eval_tokens_per_second())
    }

    /// Whether the test could not be run at all, as opposed to individual cases failing.
    pub fn failed_whole(&self) -> bool {
        self.error.is_some() && self.case_results.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.case_results.iter().filter(|c| c.is_error()).count()
    }
}
