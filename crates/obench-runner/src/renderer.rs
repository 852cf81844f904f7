use std::fmt::Write as _;

use ascii_tree::{Tree, write_tree};
use obench_types::{CaseResult, TestResult};

use crate::report::{Report, format_average, format_duration_ns, format_model_name, format_score};

/// Width of the bar in the cumulative progress chart.
const CHART_WIDTH: usize = 40;

/// Renders a finished `TestResult` into a human-readable ASCII tree.
///
/// One node per case attempt, with its output or error as a leaf.
pub fn render_result_as_tree(model: &str, test_name: &str, result: &TestResult) -> String {
    let status_icon = if result.failed_whole() {
        "❌"
    } else if result.score == result.max_score {
        "✅"
    } else {
        "⚠️"
    };
    let mut root_label = format!(
        "{status_icon} {model} / {test_name} ({})",
        format_score(result.score, result.max_score)
    );
    if let Some(tps) = result.eval_tokens_per_second() {
        root_label.push_str(&format!(" {tps:.1} t/s"));
    }

    let mut children: Vec<Tree> = result.case_results.iter().map(render_case_node).collect();
    if let Some(error) = &result.error {
        children.push(Tree::Leaf(vec![format!("Error: {error}")]));
    }

    let tree = Tree::Node(root_label, children);
    let mut buffer = String::new();
    if write_tree(&mut buffer, &tree).is_err() {
        return format!("{model} / {test_name}: {}", result.output);
    }
    buffer
}

fn render_case_node(case: &CaseResult) -> Tree {
    let icon = if case.is_error() {
        "❌"
    } else if case.is_perfect() {
        "✅"
    } else {
        "➖"
    };
    let mut label = format!(
        "{icon} {} ({})",
        case.case_id,
        format_score(case.score, case.max_score)
    );
    if let Some(duration) = format_duration_ns(case.stats.total_duration.map(|d| d as f64)) {
        label.push_str(&format!(" {duration}"));
    }

    let leaf = match &case.error {
        Some(error) => format!("error: {error}"),
        None if case.output.is_empty() => "(no output)".to_string(),
        None => format!("expected {} | got {}", case.expected, case.output),
    };
    Tree::Node(label, vec![Tree::Leaf(vec![leaf])])
}

/// Plain-text comparison table, one line per model.
pub fn render_table(report: &Report) -> String {
    let mut header = vec!["Model".to_string()];
    header.extend(report.columns.iter().map(|c| c.name.clone()));
    header.push("Average".to_string());

    let mut lines: Vec<Vec<String>> = vec![header];
    if let Some(message) = &report.message {
        let mut out = format_lines(&lines);
        out.push_str(message);
        out.push('\n');
        return out;
    }

    for row in &report.rows {
        let mut name = format_model_name(&row.model);
        if row.excluded {
            name.push_str(" (excluded)");
        }
        let mut cells = vec![name];
        cells.extend(row.cells.iter().map(|cell| cell.text()));
        cells.push(format_average(row.average));
        lines.push(cells);
    }

    let mut out = format_lines(&lines);
    for row in &report.rows {
        let meta: Vec<&str> = [row.size_text.as_deref(), row.runtime_text.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !meta.is_empty() {
            let _ = writeln!(out, "  {}: {}", row.model, meta.join(" • "));
        }
    }
    out
}

fn format_lines(lines: &[Vec<String>]) -> String {
    let columns = lines.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|i| {
            lines
                .iter()
                .filter_map(|line| line.get(i))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    for (index, line) in lines.iter().enumerate() {
        let padded: Vec<String> = line
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        let _ = writeln!(out, "{}", padded.join(" | ").trim_end());
        if index == 0 {
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            let _ = writeln!(out, "{}", rule.join("-+-"));
        }
    }
    out
}

/// Cumulative score per model across the test columns, as horizontal bars.
///
/// Each model gets one line per test showing its running total against the maximum
/// achievable; gaps after the first score are shown as `-`.
pub fn render_cumulative_chart(report: &Report) -> String {
    let max_total = report.max_total();
    if report.columns.is_empty() || report.rows.is_empty() || max_total == 0 {
        return "No data to chart.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Cumulative score (max {max_total})");
    for row in &report.rows {
        let Some(series) = &row.cumulative else {
            continue;
        };
        let _ = writeln!(out, "{}", format_model_name(&row.model));
        for (column, point) in report.columns.iter().zip(series) {
            match point {
                Some(total) => {
                    let filled = (*total as f64 / max_total as f64 * CHART_WIDTH as f64).round() as usize;
                    let filled = filled.min(CHART_WIDTH);
                    let _ = writeln!(
                        out,
                        "  {:<24} {}{} {total}",
                        format_model_name(&column.name),
                        "█".repeat(filled),
                        "·".repeat(CHART_WIDTH - filled),
                    );
                }
                None => {
                    let _ = writeln!(out, "  {:<24} -", format_model_name(&column.name));
                }
            }
        }
    }
    out
}
