mod common;

use common::*;
use obench_db::{ResultLogRow, summarize_log};
use obench_lib::model::ModelFilter;
use obench_runner::{
    renderer::{render_cumulative_chart, render_table},
    report::{Cell, ViewMode, log_report, suite_report},
    state::BenchState,
};

fn aggregate(model: &str, test_id: &str, test_name: &str, score: Option<u32>, max: u32) -> ResultLogRow {
    ResultLogRow {
        timestamp: "2024-05-01T10:00:00.000Z".to_string(),
        model: model.to_string(),
        test_id: test_id.to_string(),
        test_name: test_name.to_string(),
        score,
        max_score: Some(max),
        total_duration: Some(4_000_000_000),
        eval_tokens_per_second: Some(42.0),
        ..ResultLogRow::default()
    }
}

#[test]
fn test_suite_report_ignores_stale_rows() {
    let suite = vec![addition(1), division(1)];
    let models = vec![
        model("alpha:7b", Some(7.0)),
        model("beta:7b", Some(7.0)),
        model("gamma:7b", Some(7.0)),
    ];
    let mut state = BenchState::new();
    // alpha: 3/4 and 2/2 -> 5/6
    state.record(aggregate("alpha:7b", "simple-addition", "Simple Addition", Some(3), 4));
    state.record(aggregate("alpha:7b", "compound-division", "Compound Division", Some(2), 2));
    // beta: full marks on addition, but division was run with a different repeat count
    state.record(aggregate("beta:7b", "simple-addition", "Simple Addition", Some(4), 4));
    state.record(aggregate("beta:7b", "compound-division", "Compound Division", Some(0), 10));

    let report = suite_report(&suite, &models, &ModelFilter::default(), &state);

    assert_eq!(report.mode, ViewMode::Suite);
    let order: Vec<&str> = report.rows.iter().map(|r| r.model.as_str()).collect();
    assert_eq!(order, vec!["beta:7b", "alpha:7b", "gamma:7b"]);

    let beta = &report.rows[0];
    assert_eq!(beta.average, Some(1.0));
    assert_eq!(beta.cells[1], Cell::Pending);
    match &beta.cells[0] {
        Cell::Scored {
            score,
            max_score,
            duration_ns,
            tokens_per_second,
            ..
        } => {
            assert_eq!((*score, *max_score), (4, 4));
            assert_eq!(*duration_ns, Some(4_000_000_000.0));
            assert_eq!(*tokens_per_second, Some(42.0));
        }
        other => panic!("unexpected cell {other:?}"),
    }

    let alpha = &report.rows[1];
    assert!((alpha.average.unwrap() - 5.0 / 6.0).abs() < 1e-9);
    assert_eq!(alpha.cumulative, Some(vec![Some(3), Some(5)]));

    let gamma = &report.rows[2];
    assert_eq!(gamma.average, None);
    assert_eq!(gamma.cumulative, None);
    assert!(gamma.size_text.as_deref().unwrap().starts_with("7.0B"));
}

#[test]
fn test_suite_report_with_failed_test() {
    let suite = vec![addition(1)];
    let models = vec![model("alpha:7b", Some(7.0))];
    let mut state = BenchState::new();
    let mut failed = aggregate("alpha:7b", "simple-addition", "Simple Addition", None, 4);
    failed.error = Some("connection refused".to_string());
    state.record(failed);

    let report = suite_report(&suite, &models, &ModelFilter::default(), &state);
    let row = &report.rows[0];
    assert!(matches!(&row.cells[0], Cell::Error { message, .. } if message == "connection refused"));
    assert_eq!(row.average, None);
    assert!(state.pending_tests("alpha:7b", &suite).is_empty());
}

#[test]
fn test_suite_report_filters() {
    let suite = vec![addition(1)];
    let models = vec![model("alpha:7b", Some(7.0)), model("beta:70b", Some(70.0))];
    let state = BenchState::new();

    let filter = ModelFilter::default().with_size_range(None, Some(10.0)).exclude("alpha:7b");
    let report = suite_report(&suite, &models, &filter, &state);
    assert_eq!(report.rows.len(), 1);
    assert!(report.rows[0].excluded);

    let invalid = ModelFilter::default().with_pattern("(");
    let report = suite_report(&suite, &models, &invalid, &state);
    assert!(report.rows.is_empty());
    assert!(report.message.is_some());
}

#[test]
fn test_log_report_counts_any_scored_row() {
    let rows = vec![
        aggregate("m1", "add", "Simple Addition", Some(8), 10),
        aggregate("m1", "sub", "Simple Subtraction", Some(10), 20),
        aggregate("m2", "sub", "Simple Subtraction", Some(20), 20),
    ];
    let summary = summarize_log(&rows);
    let report = log_report(&summary);

    assert_eq!(report.max_total(), 30);
    let order: Vec<&str> = report.rows.iter().map(|r| r.model.as_str()).collect();
    assert_eq!(order, vec!["m2", "m1"]);
    assert!((report.rows[1].average.unwrap() - 18.0 / 30.0).abs() < 1e-9);
    assert_eq!(report.rows[0].cumulative, Some(vec![Some(0), Some(20)]));
    assert_eq!(report.rows[1].cumulative, Some(vec![Some(8), Some(18)]));

    let table = render_table(&report);
    assert!(table.contains("100.0%"));
    assert!(table.contains("60.0%"));
    let chart = render_cumulative_chart(&report);
    assert!(chart.contains("m2"));
}

#[test]
fn test_log_report_empty() {
    let report = log_report(&summarize_log(&[]));
    assert_eq!(report.message.as_deref(), Some("No results found in CSV."));
    assert!(render_table(&report).contains("No results found in CSV."));
    assert_eq!(render_cumulative_chart(&report), "No data to chart.\n");
}
