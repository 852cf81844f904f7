//! Row schema of the result log and the views built from it

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use csv::StringRecord;
use obench_types::{Stats, TestResult};
use serde::{Deserialize, Serialize};

/// Column names of the result log, in file order.
pub const HEADERS: [&str; 21] = [
    "timestamp",
    "model",
    "model_size_bytes",
    "model_param_b",
    "test_id",
    "test_name",
    "case_id",
    "case_prompt",
    "expected",
    "score",
    "max_score",
    "output",
    "error",
    "prompt_eval_count",
    "eval_count",
    "prompt_eval_duration",
    "eval_duration",
    "total_duration",
    "load_duration",
    "prompt_tokens_per_second",
    "eval_tokens_per_second",
];

/// The header line as written to a fresh file.
pub fn header_line() -> String {
    format!("{}\n", HEADERS.join(","))
}

/// One line of the result log.
///
/// Aggregate rows leave `case_id` empty; case rows carry the repeat-suffixed case id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultLogRow {
    pub timestamp: String,
    pub model: String,
    pub model_size_bytes: Option<u64>,
    pub model_param_b: Option<f64>,
    pub test_id: String,
    pub test_name: String,
    pub case_id: String,
    pub case_prompt: String,
    pub expected: String,
    pub score: Option<u32>,
    pub max_score: Option<u32>,
    pub output: String,
    pub error: Option<String>,
    pub prompt_eval_count: Option<u64>,
    pub eval_count: Option<u64>,
    pub prompt_eval_duration: Option<u64>,
    pub eval_duration: Option<u64>,
    pub total_duration: Option<u64>,
    pub load_duration: Option<u64>,
    pub prompt_tokens_per_second: Option<f64>,
    pub eval_tokens_per_second: Option<f64>,
}

/// Column positions of a log file's header, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new(headers: &StringRecord) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Self { positions }
    }

    /// Field `name` of `record`, empty when the column or the field is missing.
    pub fn get<'r>(&self, record: &'r StringRecord, name: &str) -> &'r str {
        self.positions
            .get(name)
            .and_then(|&i| record.get(i))
            .unwrap_or("")
    }
}

fn text(value: &str) -> String {
    value.to_string()
}

fn optional_text(value: &str) -> Option<String> {
    (!value.trim().is_empty()).then(|| value.to_string())
}

/// Lenient float: blanks and garbage are `None`.
pub fn parse_f64(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Lenient count: accepts `"4"`, `"4.0"` and exponent forms.
pub fn parse_u64(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    if let Ok(n) = trimmed.parse::<u64>() {
        return Some(n);
    }
    parse_f64(trimmed)
        .filter(|v| *v >= 0.0 && *v <= u64::MAX as f64)
        .map(|v| v.round() as u64)
}

pub fn parse_u32(value: &str) -> Option<u32> {
    parse_u64(value).and_then(|v| u32::try_from(v).ok())
}

fn format_u64(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn format_f64(value: Option<f64>) -> String {
    value
        .filter(|v| v.is_finite())
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// Timestamp text written to the log: RFC 3339, millisecond precision, `Z` suffix.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl ResultLogRow {
    pub fn is_case_row(&self) -> bool {
        !self.case_id.trim().is_empty()
    }

    /// Fields in [`HEADERS`] order; missing values are empty strings.
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.model.clone(),
            format_u64(self.model_size_bytes),
            format_f64(self.model_param_b),
            self.test_id.clone(),
            self.test_name.clone(),
            self.case_id.clone(),
            self.case_prompt.clone(),
            self.expected.clone(),
            format_u64(self.score.map(u64::from)),
            format_u64(self.max_score.map(u64::from)),
            self.output.clone(),
            self.error.clone().unwrap_or_default(),
            format_u64(self.prompt_eval_count),
            format_u64(self.eval_count),
            format_u64(self.prompt_eval_duration),
            format_u64(self.eval_duration),
            format_u64(self.total_duration),
            format_u64(self.load_duration),
            format_f64(self.prompt_tokens_per_second),
            format_f64(self.eval_tokens_per_second),
        ]
    }

    /// Reads a record by column name, so files written with an older column order still load.
    pub fn from_record(record: &StringRecord, index: &HeaderIndex) -> Self {
        let field = |name: &str| index.get(record, name);
        Self {
            timestamp: text(field("timestamp")),
            model: text(field("model")),
            model_size_bytes: parse_u64(field("model_size_bytes")),
            model_param_b: parse_f64(field("model_param_b")),
            test_id: text(field("test_id")),
            test_name: text(field("test_name")),
            case_id: text(field("case_id")),
            case_prompt: text(field("case_prompt")),
            expected: text(field("expected")),
            score: parse_u32(field("score")),
            max_score: parse_u32(field("max_score")),
            output: text(field("output")),
            error: optional_text(field("error")),
            prompt_eval_count: parse_u64(field("prompt_eval_count")),
            eval_count: parse_u64(field("eval_count")),
            prompt_eval_duration: parse_u64(field("prompt_eval_duration")),
            eval_duration: parse_u64(field("eval_duration")),
            total_duration: parse_u64(field("total_duration")),
            load_duration: parse_u64(field("load_duration")),
            prompt_tokens_per_second: parse_f64(field("prompt_tokens_per_second")),
            eval_tokens_per_second: parse_f64(field("eval_tokens_per_second")),
        }
    }

    pub fn stats(&self) -> Stats {
        Stats {
            prompt_eval_count: self.prompt_eval_count,
            eval_count: self.eval_count,
            prompt_eval_duration: self.prompt_eval_duration,
            eval_duration: self.eval_duration,
            total_duration: self.total_duration,
            load_duration: self.load_duration,
        }
    }

    fn with_stats(mut self, stats: &Stats) -> Self {
        self.prompt_eval_count = stats.prompt_eval_count;
        self.eval_count = stats.eval_count;
        self.prompt_eval_duration = stats.prompt_eval_duration;
        self.eval_duration = stats.eval_duration;
        self.total_duration = stats.total_duration;
        self.load_duration = stats.load_duration;
        self
    }
}

/// Identity of the (model, test) pair a result belongs to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowContext {
    pub model: String,
    pub model_size_bytes: Option<u64>,
    pub model_param_b: Option<f64>,
    pub test_id: String,
    pub test_name: String,
}

impl RowContext {
    fn row(&self, timestamp: String) -> ResultLogRow {
        ResultLogRow {
            timestamp,
            model: self.model.clone(),
            model_size_bytes: self.model_size_bytes,
            model_param_b: self.model_param_b,
            test_id: self.test_id.clone(),
            test_name: self.test_name.clone(),
            ..ResultLogRow::default()
        }
    }
}

/// Flattens a result into one aggregate row followed by one row per case attempt.
///
/// A result that failed as a whole is written without a score.
pub fn rows_from_result(context: &RowContext, result: &TestResult) -> Vec<ResultLogRow> {
    let failed_whole = result.failed_whole();
    let mut rows = Vec::with_capacity(result.case_results.len() + 1);
    rows.push(
        ResultLogRow {
            score: (!failed_whole).then_some(result.score),
            max_score: Some(result.max_score),
            output: result.output.clone(),
            error: result.error.clone(),
            prompt_tokens_per_second: result.prompt_tokens_per_second(),
            eval_tokens_per_second: result.eval_tokens_per_second(),
            ..context.row(format_timestamp(&result.completed_at))
        }
        .with_stats(&result.stats),
    );
    rows.extend(result.case_results.iter().map(|case| {
        ResultLogRow {
            case_id: case.case_id.clone(),
            case_prompt: case.prompt.clone(),
            expected: case.expected.clone(),
            score: Some(case.score),
            max_score: Some(case.max_score),
            output: case.output.clone(),
            error: case.error.clone(),
            prompt_tokens_per_second: case.stats.prompt_tokens_per_second(),
            eval_tokens_per_second: case.stats.eval_tokens_per_second(),
            ..context.row(format_timestamp(&case.completed_at))
        }
        .with_stats(&case.stats)
    }));
    rows
}

/// A latest aggregate row as served to readers, with camelCase keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResult {
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub output: String,
    pub error: Option<String>,
    pub completed_at: String,
    pub prompt_eval_count: Option<f64>,
    pub eval_count: Option<f64>,
    pub prompt_eval_duration: Option<f64>,
    pub eval_duration: Option<f64>,
    pub total_duration: Option<f64>,
    pub load_duration: Option<f64>,
    pub prompt_tokens_per_second: Option<f64>,
    pub eval_tokens_per_second: Option<f64>,
}

impl From<&ResultLogRow> for NormalizedResult {
    fn from(row: &ResultLogRow) -> Self {
        let float = |v: Option<u64>| v.map(|n| n as f64);
        Self {
            score: row.score.map(f64::from),
            max_score: row.max_score.map(f64::from),
            output: row.output.clone(),
            error: row.error.clone().filter(|e| !e.trim().is_empty()),
            completed_at: row.timestamp.clone(),
            prompt_eval_count: float(row.prompt_eval_count),
            eval_count: float(row.eval_count),
            prompt_eval_duration: float(row.prompt_eval_duration),
            eval_duration: float(row.eval_duration),
            total_duration: float(row.total_duration),
            load_duration: float(row.load_duration),
            prompt_tokens_per_second: row.prompt_tokens_per_second,
            eval_tokens_per_second: row.eval_tokens_per_second,
        }
    }
}

impl NormalizedResult {
    /// Back to a log row for `model`/`test_id`, as far as the normalized fields allow.
    pub fn to_row(&self, model: &str, test_id: &str) -> ResultLogRow {
        let count = |v: Option<f64>| {
            v.filter(|n| n.is_finite() && *n >= 0.0)
                .map(|n| n.round() as u64)
        };
        ResultLogRow {
            timestamp: self.completed_at.clone(),
            model: model.to_string(),
            test_id: test_id.to_string(),
            test_name: test_id.to_string(),
            score: count(self.score).and_then(|n| u32::try_from(n).ok()),
            max_score: count(self.max_score).and_then(|n| u32::try_from(n).ok()),
            output: self.output.clone(),
            error: self.error.clone(),
            prompt_eval_count: count(self.prompt_eval_count),
            eval_count: count(self.eval_count),
            prompt_eval_duration: count(self.prompt_eval_duration),
            eval_duration: count(self.eval_duration),
            total_duration: count(self.total_duration),
            load_duration: count(self.load_duration),
            prompt_tokens_per_second: self.prompt_tokens_per_second,
            eval_tokens_per_second: self.eval_tokens_per_second,
            ..ResultLogRow::default()
        }
    }
}

/// Body of `GET /api/results`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsPayload {
    pub results: BTreeMap<String, BTreeMap<String, NormalizedResult>>,
    pub last_updated: Option<String>,
}
