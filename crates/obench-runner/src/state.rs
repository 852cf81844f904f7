//! In-memory view of what has been run so far

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use obench_db::{LatestResults, ResultLogRow, parse_timestamp};
use obench_lib::benchmark::TestDefinition;
use obench_types::RuntimeInfo;

/// Latest aggregate row per (model, test id) plus runtime placement per model.
///
/// Seeded from the reduced log and updated as tests finish, whether or not the result
/// made it to the store.
#[derive(Debug, Clone, Default)]
pub struct BenchState {
    results: BTreeMap<String, BTreeMap<String, ResultLogRow>>,
    runtime: HashMap<String, RuntimeInfo>,
    last_updated: Option<DateTime<Utc>>,
}

impl BenchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_latest(latest: &LatestResults) -> Self {
        let mut state = Self::new();
        for model in latest.models() {
            for (test_id, row) in latest.for_model(model) {
                state
                    .results
                    .entry(model.to_string())
                    .or_default()
                    .insert(test_id.to_string(), row.clone());
            }
        }
        state.last_updated = latest.last_updated;
        state
    }

    pub fn result(&self, model: &str, test_id: &str) -> Option<&ResultLogRow> {
        self.results.get(model)?.get(test_id)
    }

    pub fn results(&self) -> &BTreeMap<String, BTreeMap<String, ResultLogRow>> {
        &self.results
    }

    /// A test is pending unless a result exists that was produced for its current max score.
    pub fn is_pending(&self, model: &str, definition: &TestDefinition) -> bool {
        !self
            .result(model, definition.id())
            .is_some_and(|row| definition.is_satisfied_by(row.max_score))
    }

    pub fn pending_tests<'a>(
        &self,
        model: &str,
        suite: &'a [TestDefinition],
    ) -> Vec<&'a TestDefinition> {
        suite
            .iter()
            .filter(|definition| self.is_pending(model, definition))
            .collect()
    }

    /// Stores the aggregate row for a finished test.
    pub fn record(&mut self, row: ResultLogRow) {
        if let Some(at) = parse_timestamp(&row.timestamp) {
            if self.last_updated.is_none_or(|last| at > last) {
                self.last_updated = Some(at);
            }
        }
        self.results
            .entry(row.model.clone())
            .or_default()
            .insert(row.test_id.clone(), row);
    }

    pub fn runtime(&self, model: &str) -> Option<&RuntimeInfo> {
        self.runtime.get(model)
    }

    pub fn set_runtime(&mut self, model: &str, info: RuntimeInfo) {
        self.runtime.insert(model.to_string(), info);
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.last_updated = None;
    }
}
