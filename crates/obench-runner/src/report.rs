//! Comparison table and progress chart data, computed from result rows.
//!
//! Two views share the same calculations. The suite view is built while benchmarking and
//! only trusts rows produced for the suite's current max score. The log view is built from
//! a results file alone and takes every scored row at face value.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use obench_db::{LogSummary, ResultLogRow, TestColumn};
use obench_lib::{benchmark::TestDefinition, model::ModelFilter};
use obench_types::{ModelSummary, RuntimeInfo};

use crate::state::BenchState;

/// Longest model name shown before truncation.
pub const MODEL_NAME_LIMIT: usize = 25;

/// Which rows count towards scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Rows must match the column's max score
    Suite,
    /// Every row with a score counts, using its own max score
    Log,
}

/// One test column of the table.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub id: String,
    pub name: String,
    pub max_score: u32,
    /// Divides the total duration into a per-repeat time when known
    pub repeat_count: Option<u32>,
}

impl From<&TestDefinition> for Column {
    fn from(definition: &TestDefinition) -> Self {
        Self {
            id: definition.id().to_string(),
            name: definition.name().to_string(),
            max_score: definition.max_score(),
            repeat_count: Some(definition.repeat_count()),
        }
    }
}

impl From<&TestColumn> for Column {
    fn from(column: &TestColumn) -> Self {
        Self {
            id: column.id.clone(),
            name: column.name.clone(),
            max_score: column.max_score,
            repeat_count: None,
        }
    }
}

/// What a table cell shows.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Pending,
    Error {
        message: String,
        detail: String,
    },
    Scored {
        score: u32,
        max_score: u32,
        duration_ns: Option<f64>,
        tokens_per_second: Option<f64>,
        detail: String,
    },
}

impl Cell {
    /// Short text for the table.
    pub fn text(&self) -> String {
        match self {
            Cell::Pending => "pending".to_string(),
            Cell::Error { .. } => "error".to_string(),
            Cell::Scored {
                score,
                max_score,
                duration_ns,
                tokens_per_second,
                ..
            } => {
                let mut text = format_score(*score, *max_score);
                if let Some(duration) = format_duration_ns(*duration_ns) {
                    text.push(' ');
                    text.push_str(&duration);
                }
                if let Some(tps) = tokens_per_second.filter(|v| v.is_finite() && *v > 0.0) {
                    text.push_str(&format!(" {tps:.1} t/s"));
                }
                text
            }
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Cell::Pending => None,
            Cell::Error { detail, .. } | Cell::Scored { detail, .. } => Some(detail),
        }
    }
}

/// One model's line in the table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub model: String,
    pub size_text: Option<String>,
    pub runtime_text: Option<String>,
    pub excluded: bool,
    pub cells: Vec<Cell>,
    pub average: Option<f64>,
    pub cumulative: Option<Vec<Option<u64>>>,
}

/// A rendered-ready table.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub mode: ViewMode,
    pub columns: Vec<Column>,
    /// Sorted by average descending, models without one last, then by name
    pub rows: Vec<ReportRow>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Set when there is nothing to tabulate
    pub message: Option<String>,
}

impl Report {
    /// Sum of every column's max score.
    pub fn max_total(&self) -> u64 {
        self.columns.iter().map(|c| u64::from(c.max_score)).sum()
    }
}

/// A model to put in the table, with what is known about it.
#[derive(Debug, Clone, Default)]
pub struct ModelEntry<'a> {
    pub name: &'a str,
    pub summary: Option<&'a ModelSummary>,
    pub runtime: Option<&'a RuntimeInfo>,
    pub excluded: bool,
}

/// Fraction of the achievable score a model earned, or `None` when nothing counts yet.
pub fn calculate_average<'r>(
    mode: ViewMode,
    columns: &[Column],
    lookup: impl Fn(&str) -> Option<&'r ResultLogRow>,
) -> Option<f64> {
    let mut total_score = 0u64;
    let mut total_max = 0u64;
    for column in columns {
        let Some(row) = lookup(&column.id) else {
            continue;
        };
        let Some(score) = row.score else {
            continue;
        };
        match mode {
            ViewMode::Suite => {
                if row.max_score == Some(column.max_score) {
                    total_score += u64::from(score);
                    total_max += u64::from(column.max_score);
                }
            }
            ViewMode::Log => {
                total_score += u64::from(score);
                total_max += u64::from(row.max_score.unwrap_or(column.max_score));
            }
        }
    }
    (total_max > 0).then(|| total_score as f64 / total_max as f64)
}

/// Running score total across the columns.
///
/// Points before the first scored column are 0, unscored columns after it are gaps.
/// Returns `None` when the model has no scored column at all.
pub fn cumulative_series<'r>(
    columns: &[Column],
    lookup: impl Fn(&str) -> Option<&'r ResultLogRow>,
) -> Option<Vec<Option<u64>>> {
    let mut running = 0u64;
    let mut has_any = false;
    let series: Vec<Option<u64>> = columns
        .iter()
        .map(|column| match lookup(&column.id).and_then(|row| row.score) {
            Some(score) => {
                running += u64::from(score);
                has_any = true;
                Some(running)
            }
            None if has_any => None,
            None => Some(0),
        })
        .collect();
    has_any.then_some(series)
}

/// Orders by average descending; unknown averages sort last; ties break on name.
pub fn compare_models(a: (&str, Option<f64>), b: (&str, Option<f64>)) -> Ordering {
    match (a.1, b.1) {
        (None, None) => a.0.cmp(b.0),
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(b.0)),
    }
}

fn cell_for(mode: ViewMode, column: &Column, row: Option<&ResultLogRow>) -> Cell {
    let Some(row) = row else {
        return Cell::Pending;
    };
    if mode == ViewMode::Suite && row.max_score != Some(column.max_score) {
        return Cell::Pending;
    }
    if let Some(error) = row.error.as_deref().filter(|e| !e.is_empty()) {
        return Cell::Error {
            message: error.to_string(),
            detail: format_result_detail(row),
        };
    }
    let Some(score) = row.score else {
        return Cell::Pending;
    };
    let max_score = row.max_score.unwrap_or(column.max_score);
    let (duration_ns, tokens_per_second) = match mode {
        ViewMode::Suite => (
            average_duration_ns(row.total_duration, column.repeat_count),
            row.eval_tokens_per_second,
        ),
        ViewMode::Log => (row.total_duration.map(|d| d as f64), None),
    };
    Cell::Scored {
        score,
        max_score,
        duration_ns,
        tokens_per_second,
        detail: format_result_detail(row),
    }
}

/// Builds the table for `models` against `columns`.
pub fn build_report<'r>(
    mode: ViewMode,
    columns: Vec<Column>,
    models: &[ModelEntry<'_>],
    lookup: impl Fn(&str, &str) -> Option<&'r ResultLogRow>,
    last_updated: Option<DateTime<Utc>>,
) -> Report {
    let mut rows: Vec<ReportRow> = models
        .iter()
        .map(|entry| {
            let for_test = |test_id: &str| lookup(entry.name, test_id);
            ReportRow {
                model: entry.name.to_string(),
                size_text: entry
                    .summary
                    .and_then(|s| format_model_size(s.size_b, s.size_bytes)),
                runtime_text: entry.runtime.map(format_runtime),
                excluded: entry.excluded,
                cells: columns
                    .iter()
                    .map(|column| cell_for(mode, column, for_test(&column.id)))
                    .collect(),
                average: calculate_average(mode, &columns, for_test),
                cumulative: cumulative_series(&columns, for_test),
            }
        })
        .collect();
    rows.sort_by(|a, b| compare_models((&a.model, a.average), (&b.model, b.average)));

    Report {
        mode,
        columns,
        rows,
        last_updated,
        message: None,
    }
}

/// Table for a live suite: the filtered models, excluded ones flagged.
pub fn suite_report(
    suite: &[TestDefinition],
    models: &[ModelSummary],
    filter: &ModelFilter,
    state: &BenchState,
) -> Report {
    let columns: Vec<Column> = suite.iter().map(Column::from).collect();
    let outcome = filter.apply(models);
    if outcome.is_invalid() {
        return Report {
            message: Some("Invalid model filter pattern.".to_string()),
            ..build_report(ViewMode::Suite, columns, &[], |_, _| None, state.last_updated())
        };
    }
    let entries: Vec<ModelEntry<'_>> = outcome
        .models()
        .iter()
        .map(|summary| ModelEntry {
            name: &summary.name,
            summary: Some(summary),
            runtime: state.runtime(&summary.name),
            excluded: filter.is_excluded(&summary.name),
        })
        .collect();
    let mut report = build_report(
        ViewMode::Suite,
        columns,
        &entries,
        |model, test_id| state.result(model, test_id),
        state.last_updated(),
    );
    if report.rows.is_empty() {
        report.message = Some("No models match the current filters.".to_string());
    }
    report
}

/// Table for a results file: tests as they appear in the log, every logged model.
pub fn log_report(summary: &LogSummary) -> Report {
    let columns: Vec<Column> = summary.tests.iter().map(Column::from).collect();
    let entries: Vec<ModelEntry<'_>> = summary
        .models
        .iter()
        .map(|name| ModelEntry {
            name,
            ..ModelEntry::default()
        })
        .collect();
    let mut report = build_report(
        ViewMode::Log,
        columns,
        &entries,
        |model, test_id| summary.latest.get(model, test_id),
        summary.last_updated(),
    );
    if report.columns.is_empty() {
        report.message = Some("No results found in CSV.".to_string());
    } else if report.rows.is_empty() {
        report.message = Some("No models available.".to_string());
    }
    report
}

pub fn average_duration_ns(total_ns: Option<u64>, repeat_count: Option<u32>) -> Option<f64> {
    let total = total_ns.filter(|t| *t > 0)? as f64;
    match repeat_count {
        Some(repeats) if repeats > 0 => Some(total / f64::from(repeats)),
        _ => Some(total),
    }
}

/// Case lines for a result, each prefixed with a pass or fail mark.
pub fn format_result_detail(row: &ResultLogRow) -> String {
    let mut lines = Vec::new();
    if let Some(error) = row.error.as_deref().filter(|e| !e.is_empty()) {
        lines.push(format!("❌ Error: {error}"));
    }
    let output = row.output.trim();
    if !output.is_empty() {
        let mark = if row.score.is_some() && row.score == row.max_score {
            "✅"
        } else {
            "❌"
        };
        lines.push(format!("{mark} {output}"));
    }
    lines.join("\n")
}

pub fn format_score(score: u32, max_score: u32) -> String {
    format!("{score}/{max_score}")
}

pub fn format_average(average: Option<f64>) -> String {
    match average {
        Some(avg) => format!("{:.1}%", avg * 100.0),
        None => "--".to_string(),
    }
}

/// Human duration from nanoseconds; `None` for absent or non-positive input.
pub fn format_duration_ns(duration_ns: Option<f64>) -> Option<String> {
    let ns = duration_ns.filter(|d| d.is_finite() && *d > 0.0)?;
    let seconds = ns / 1e9;
    let text = if seconds < 1.0 {
        let ms = seconds * 1000.0;
        if ms < 100.0 {
            format!("{ms:.1} ms")
        } else {
            format!("{ms:.0} ms")
        }
    } else if seconds < 10.0 {
        format!("{seconds:.2} s")
    } else if seconds < 60.0 {
        format!("{seconds:.1} s")
    } else {
        let minutes = (seconds / 60.0).floor();
        let remaining = (seconds % 60.0).round();
        format!("{minutes:.0}m {remaining:.0}s")
    };
    Some(text)
}

pub fn format_model_name(name: &str) -> String {
    if name.chars().count() <= MODEL_NAME_LIMIT {
        return name.to_string();
    }
    let head: String = name.chars().take(MODEL_NAME_LIMIT - 3).collect();
    format!("{head}...")
}

pub fn format_param_count(size_b: Option<f64>) -> Option<String> {
    let size = size_b.filter(|s| s.is_finite())?;
    Some(if size >= 10.0 {
        format!("{size:.0}B")
    } else if size < 1.0 {
        format!("{size:.2}B")
    } else {
        format!("{size:.1}B")
    })
}

pub fn format_size_gb(size_bytes: Option<u64>) -> Option<String> {
    let bytes = size_bytes.filter(|b| *b > 0)?;
    let gb = bytes as f64 / 1e9;
    Some(if gb >= 10.0 {
        format!("{gb:.1} GB")
    } else if gb < 1.0 {
        format!("{gb:.3} GB")
    } else {
        format!("{gb:.2} GB")
    })
}

/// `"7.6B / 4.68 GB"`, or whichever half is known.
pub fn format_model_size(size_b: Option<f64>, size_bytes: Option<u64>) -> Option<String> {
    match (format_param_count(size_b), format_size_gb(size_bytes)) {
        (Some(params), Some(gb)) => Some(format!("{params} / {gb}")),
        (params, gb) => params.or(gb),
    }
}

pub fn format_gb(bytes: Option<u64>) -> Option<String> {
    let gb = bytes.filter(|b| *b > 0)? as f64 / 1e9;
    Some(if gb >= 10.0 {
        format!("{gb:.1} GB")
    } else {
        format!("{gb:.2} GB")
    })
}

pub fn format_percent(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let clamped = value.clamp(0.0, 100.0);
    Some(if clamped >= 10.0 {
        format!("{clamped:.0}%")
    } else {
        format!("{clamped:.1}%")
    })
}

/// `"runtime: CPU 0% / GPU 100% • 5.10 GB • ctx ~2.15 GB"`
pub fn format_runtime(info: &RuntimeInfo) -> String {
    let cpu = format_percent(info.cpu_percent).unwrap_or_else(|| "?".to_string());
    let gpu = format_percent(info.gpu_percent).unwrap_or_else(|| "?".to_string());
    let size = format_gb(Some(info.total_bytes)).unwrap_or_else(|| "n/a".to_string());
    match format_gb(info.context_bytes_estimated) {
        Some(ctx) => format!("runtime: CPU {cpu} / GPU {gpu} • {size} • ctx ~{ctx}"),
        None => format!("runtime: CPU {cpu} / GPU {gpu} • {size}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, None)]
    #[case(Some(0.0), None)]
    #[case(Some(12_345_678.0), Some("12.3 ms"))]
    #[case(Some(250_000_000.0), Some("250 ms"))]
    #[case(Some(2_500_000_000.0), Some("2.50 s"))]
    #[case(Some(42_340_000_000.0), Some("42.3 s"))]
    #[case(Some(125_000_000_000.0), Some("2m 5s"))]
    fn test_format_duration_ns(#[case] ns: Option<f64>, #[case] expected: Option<&str>) {
        assert_eq!(format_duration_ns(ns).as_deref(), expected);
    }

    #[rstest]
    #[case(Some(70.0), Some(42_000_000_000), "70B / 42.0 GB")]
    #[case(Some(7.6), Some(4_683_000_000), "7.6B / 4.68 GB")]
    #[case(Some(0.5), Some(397_000_000), "0.50B / 0.397 GB")]
    #[case(None, Some(4_683_000_000), "4.68 GB")]
    fn test_format_model_size(
        #[case] size_b: Option<f64>,
        #[case] bytes: Option<u64>,
        #[case] expected: &str,
    ) {
        assert_eq!(format_model_size(size_b, bytes).as_deref(), Some(expected));
    }

    #[test]
    fn test_format_model_name_truncates_long_names() {
        assert_eq!(format_model_name("llama3:8b"), "llama3:8b");
        let long = "hf.co/bartowski/Qwen2.5-7B-Instruct-GGUF:Q4_K_M";
        let shown = format_model_name(long);
        assert_eq!(shown.chars().count(), 25);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn test_format_runtime() {
        let info = RuntimeInfo {
            total_bytes: 5_100_000_000,
            vram_bytes: 5_100_000_000,
            cpu_percent: 0.0,
            gpu_percent: 100.0,
            context_length: Some(4096),
            context_tokens: Some(32768),
            context_bytes_estimated: Some(2_147_483_648),
        };
        assert_eq!(format_runtime(&info), "runtime: CPU 0.0% / GPU 100% • 5.10 GB • ctx ~2.15 GB");
        let info = RuntimeInfo {
            context_bytes_estimated: None,
            cpu_percent: 150.0,
            ..info
        };
        assert_eq!(format_runtime(&info), "runtime: CPU 100% / GPU 100% • 5.10 GB");
    }

    #[test]
    fn test_compare_models_orders_unknown_last() {
        let mut models = vec![("b", Some(0.5)), ("z", None), ("a", Some(0.5)), ("c", Some(0.9)), ("y", None)];
        models.sort_by(|a, b| compare_models(*a, *b));
        let names: Vec<_> = models.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["c", "a", "b", "y", "z"]);
    }

    #[test]
    fn test_average_duration_divides_by_repeats() {
        assert_eq!(average_duration_ns(Some(10_000), Some(5)), Some(2_000.0));
        assert_eq!(average_duration_ns(Some(10_000), None), Some(10_000.0));
        assert_eq!(average_duration_ns(Some(0), Some(5)), None);
    }

    #[test]
    fn test_format_average() {
        assert_eq!(format_average(Some(0.8126)), "81.3%");
        assert_eq!(format_average(None), "--");
    }
}
