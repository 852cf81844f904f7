use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, ensure};
use chrono::Utc;
use obench_db::{ResultStore, RowContext, rows_from_result};
use obench_lib::{
    benchmark::TestDefinition,
    metrics::{StatsAccumulator, average_finite},
    model::ModelFilter,
    notify::RunObserver,
    ollama::InferenceClient,
    score::score_answer,
};
use obench_types::{
    CASE_MAX_SCORE, CaseResult, FailureKind, FailureScope, ModelSummary, RunFailure, Stats,
    TestResult,
};
use tracing::{debug, info, instrument, warn};

pub mod http_store;
pub mod renderer;
pub mod report;
pub mod state;

use state::BenchState;

/// One summary line for a case attempt.
fn summary_line(case: &CaseResult) -> String {
    let label = if case.case_id.is_empty() {
        "case"
    } else {
        case.case_id.as_str()
    };
    match (&case.error, case.output.is_empty()) {
        (Some(error), _) => format!("{label}: error: {error}"),
        (None, false) => format!("{label}: {}", case.output),
        (None, true) => format!("{label}: (no output)"),
    }
}

/// Runs every case of `definition` against `model`, `repeat_count` times.
///
/// Repeats run in increasing order and cases in declaration order, one call at a time.
/// A failed call scores zero for that case, is reported to `observer` once and the run
/// carries on; only a malformed definition makes this return an error.
#[instrument(skip_all, fields(model = %model, test = %definition.name()))]
pub async fn run_test(
    client: &dyn InferenceClient,
    definition: &TestDefinition,
    model: &str,
    observer: &dyn RunObserver,
) -> Result<TestResult> {
    ensure!(
        definition.repeat_count() > 0 && !definition.cases().is_empty(),
        "Test '{}' has nothing to run",
        definition.id()
    );

    let mut totals = StatsAccumulator::new();
    let mut repeat_totals: Vec<Stats> = Vec::with_capacity(definition.repeat_count() as usize);
    let mut case_results = Vec::with_capacity(definition.run_count());
    let mut score = 0u32;

    for repeat in 1..=definition.repeat_count() {
        let mut repeat_acc = StatsAccumulator::new();
        for case in definition.cases() {
            let case_id = format!("{} #{repeat}", case.id);
            let (output, error, stats, points) = match client.chat(model, &case.prompt).await {
                Ok(reply) => {
                    let output = reply.text.trim().to_string();
                    totals.add(&reply.stats);
                    repeat_acc.add(&reply.stats);
                    let points = score_answer(&output, &case.expected, case.match_mode).points();
                    debug!(case = %case_id, points, "Case scored");
                    (output, None, reply.stats, points)
                }
                Err(err) => {
                    let message = err.to_string();
                    observer.notify(&RunFailure::new(
                        FailureKind::Case,
                        FailureScope::case(model, definition.name(), &case_id),
                        message.clone(),
                    ));
                    (String::new(), Some(message), Stats::default(), 0)
                }
            };
            score += points;
            case_results.push(CaseResult {
                case_id,
                prompt: case.prompt.clone(),
                expected: case.expected.clone(),
                score: points,
                max_score: CASE_MAX_SCORE,
                output,
                error,
                completed_at: Utc::now(),
                stats,
            });
        }
        repeat_totals.push(repeat_acc.finalize());
    }

    let output = case_results
        .iter()
        .map(summary_line)
        .collect::<Vec<_>>()
        .join("\n---\n");

    let result = TestResult {
        score,
        max_score: definition.max_score(),
        output,
        completed_at: Utc::now(),
        stats: totals.finalize(),
        avg_prompt_tokens_per_second: average_finite(
            repeat_totals.iter().map(Stats::prompt_tokens_per_second),
        ),
        avg_eval_tokens_per_second: average_finite(
            repeat_totals.iter().map(Stats::eval_tokens_per_second),
        ),
        case_results,
        error: None,
    };
    info!(
        score = result.score,
        max_score = result.max_score,
        errors = result.error_count(),
        "Test finished"
    );
    Ok(result)
}

/// What one benchmark pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tests that produced a result, successful or not
    pub tests_run: usize,
    /// Tests skipped because a complete result already existed
    pub tests_skipped: usize,
    /// Models skipped because they were excluded
    pub models_skipped: usize,
    /// Results that could not be written to the store
    pub persist_failures: usize,
    /// Whether the pass stopped early on request
    pub cancelled: bool,
}

/// Collaborators for a benchmark pass.
pub struct BenchmarkRun<'a> {
    pub client: &'a dyn InferenceClient,
    pub store: &'a dyn ResultStore,
    pub observer: &'a dyn RunObserver,
    pub suite: &'a [TestDefinition],
    pub filter: &'a ModelFilter,
    /// Checked between tests; set it to stop after the current test
    pub cancel: &'a AtomicBool,
    /// Called with every finished result, before it is persisted
    pub on_result: Option<&'a ResultCallback<'a>>,
}

/// Callback invoked with each finished (model, test, result).
pub type ResultCallback<'a> = dyn Fn(&ModelSummary, &TestDefinition, &TestResult) + Sync + 'a;

/// Runs every pending (model, test) pair for the selected models.
///
/// Models run one after another, each finishing its pending tests before the next starts.
/// Every result is written to the store as soon as its test finishes; a failed write is
/// reported and the result is kept in `state` regardless.
#[instrument(skip_all, fields(models = models.len(), tests = run.suite.len()))]
pub async fn run_pending_benchmarks(
    run: &BenchmarkRun<'_>,
    models: &[ModelSummary],
    state: &mut BenchState,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    'models: for model in models {
        if run.filter.is_excluded(&model.name) {
            debug!(model = %model.name, "Skipping excluded model");
            summary.models_skipped += 1;
            continue;
        }

        let mut runtime_captured = state.runtime(&model.name).is_some();
        for definition in run.suite {
            if run.cancel.load(Ordering::SeqCst) {
                summary.cancelled = true;
                break 'models;
            }
            if !state.is_pending(&model.name, definition) {
                summary.tests_skipped += 1;
                continue;
            }

            info!(model = %model.name, test = %definition.name(), "Running test");
            let result = match run_test(run.client, definition, &model.name, run.observer).await {
                Ok(result) => result,
                Err(err) => {
                    let message = err.to_string();
                    run.observer.notify(&RunFailure::new(
                        FailureKind::Test,
                        FailureScope::test(&model.name, definition.name()),
                        message.clone(),
                    ));
                    TestResult::failed(definition.max_score(), message, Utc::now())
                }
            };
            summary.tests_run += 1;
            if let Some(on_result) = run.on_result {
                on_result(model, definition, &result);
            }

            let context = RowContext {
                model: model.name.clone(),
                model_size_bytes: model.size_bytes,
                model_param_b: model.size_b,
                test_id: definition.id().to_string(),
                test_name: definition.name().to_string(),
            };
            let rows = rows_from_result(&context, &result);
            if let Err(err) = run.store.append_rows(&rows).await {
                warn!(store = %run.store.location(), error = %err, "Failed to persist result");
                summary.persist_failures += 1;
                run.observer.notify(&RunFailure::new(
                    FailureKind::Persist,
                    FailureScope::test(&model.name, definition.name()),
                    err.to_string(),
                ));
            }
            if let Some(aggregate) = rows.into_iter().next() {
                state.record(aggregate);
            }

            if !runtime_captured {
                match run.client.runtime_info(&model.name).await {
                    Ok(Some(info)) => {
                        state.set_runtime(&model.name, info);
                        runtime_captured = true;
                    }
                    Ok(None) => debug!(model = %model.name, "Model not loaded; no runtime info"),
                    Err(err) => run.observer.notify(&RunFailure::new(
                        FailureKind::Runtime,
                        FailureScope::model(&model.name),
                        err.to_string(),
                    )),
                }
            }
        }
    }

    info!(
        tests_run = summary.tests_run,
        tests_skipped = summary.tests_skipped,
        persist_failures = summary.persist_failures,
        cancelled = summary.cancelled,
        "Benchmark pass finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: &str, output: &str, error: Option<&str>) -> CaseResult {
        CaseResult {
            case_id: id.to_string(),
            prompt: String::new(),
            expected: String::new(),
            score: 0,
            max_score: 2,
            output: output.to_string(),
            error: error.map(str::to_string),
            completed_at: Utc::now(),
            stats: Stats::default(),
        }
    }

    #[test]
    fn test_summary_line_variants() {
        assert_eq!(summary_line(&case("1+1 #1", "2", None)), "1+1 #1: 2");
        assert_eq!(
            summary_line(&case("1+1 #1", "", Some("Empty response"))),
            "1+1 #1: error: Empty response"
        );
        assert_eq!(summary_line(&case("1+1 #2", "", None)), "1+1 #2: (no output)");
        assert_eq!(summary_line(&case("", "7", None)), "case: 7");
    }
}
