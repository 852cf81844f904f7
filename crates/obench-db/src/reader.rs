//! Result log reader and reducer
//!
//! The log is append-only; the current state is rebuilt on every load by replaying it
//! into a last-writer-wins map keyed by (model, test id).

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::types::{format_timestamp, HeaderIndex, NormalizedResult, ResultLogRow, ResultsPayload};

/// Reads every row of the file at `path`. A missing or empty file has no rows.
pub fn read_rows(path: &Path) -> Result<Vec<ResultLogRow>> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StoreError::filesystem(path.display().to_string(), err)),
    };
    let rows = parse_rows(file).map_err(|e| StoreError::csv(path.display().to_string(), e))?;
    debug!(path = %path.display(), rows = rows.len(), "Read result log");
    Ok(rows)
}

/// Parses CSV text with a header line into rows, columns matched by name.
///
/// Records that fail to decode, or that have fewer fields than the header (an append cut
/// short), are skipped with a warning.
pub fn parse_rows<R: Read>(input: R) -> std::result::Result<Vec<ResultLogRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }
    let index = HeaderIndex::new(&headers);
    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        match record {
            Ok(record) if record.len() < headers.len() => warn!(
                record = line + 1,
                fields = record.len(),
                expected = headers.len(),
                "Skipping incomplete result row"
            ),
            Ok(record) => rows.push(ResultLogRow::from_record(&record, &index)),
            Err(err) => warn!(record = line + 1, error = %err, "Skipping malformed result row"),
        }
    }
    Ok(rows)
}

/// Parses RFC 3339 or `YYYY-MM-DD[ T]HH:MM:SS[.fff]` (taken as UTC) or a bare date.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    row: ResultLogRow,
    at: Option<DateTime<Utc>>,
}

/// The latest aggregate row per (model, test id).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestResults {
    entries: BTreeMap<String, BTreeMap<String, Entry>>,
    /// Newest parseable timestamp among the aggregate rows
    pub last_updated: Option<DateTime<Utc>>,
}

impl LatestResults {
    pub fn get(&self, model: &str, test_id: &str) -> Option<&ResultLogRow> {
        self.entries.get(model)?.get(test_id).map(|e| &e.row)
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Latest rows of one model keyed by test id.
    pub fn for_model(&self, model: &str) -> BTreeMap<&str, &ResultLogRow> {
        self.entries
            .get(model)
            .map(|tests| tests.iter().map(|(id, e)| (id.as_str(), &e.row)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `GET /api/results` body for this view.
    pub fn to_payload(&self) -> ResultsPayload {
        let results = self
            .entries
            .iter()
            .map(|(model, tests)| {
                let tests = tests
                    .iter()
                    .map(|(id, e)| (id.clone(), NormalizedResult::from(&e.row)))
                    .collect();
                (model.clone(), tests)
            })
            .collect();
        ResultsPayload {
            results,
            last_updated: self.last_updated.as_ref().map(format_timestamp),
        }
    }

    fn offer(&mut self, model: &str, test_id: &str, row: &ResultLogRow) {
        let at = parse_timestamp(&row.timestamp);
        if let Some(at) = at {
            if self.last_updated.is_none_or(|last| at > last) {
                self.last_updated = Some(at);
            }
        }

        let tests = self.entries.entry(model.to_string()).or_default();
        let replace = match tests.get(test_id) {
            None => true,
            Some(current) => match (at, current.at) {
                (Some(at), Some(current_at)) => at > current_at,
                (Some(_), None) => true,
                (None, _) => false,
            },
        };
        if replace {
            tests.insert(
                test_id.to_string(),
                Entry {
                    row: row.clone(),
                    at,
                },
            );
        }
    }
}

/// Replays rows in file order into the latest-result view.
///
/// Rows with a blank model or test id and case rows are ignored. A row replaces the
/// current entry when there is none, or when its timestamp parses and is strictly newer
/// than the current one (or the current one has none). Exact ties keep the earlier row.
pub fn reduce_rows(rows: &[ResultLogRow]) -> LatestResults {
    let mut latest = LatestResults::default();
    for row in rows {
        let model = row.model.trim();
        let test_id = row.test_id.trim();
        if model.is_empty() || test_id.is_empty() || row.is_case_row() {
            continue;
        }
        latest.offer(model, test_id, row);
    }
    latest
}

/// A test column as discovered in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestColumn {
    pub id: String,
    pub name: String,
    /// `max_score` of the first aggregate row seen for this test, 0 when blank
    pub max_score: u32,
}

/// Everything the results view needs from one log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSummary {
    /// Tests in order of first appearance
    pub tests: Vec<TestColumn>,
    /// Models with at least one aggregate row, sorted
    pub models: Vec<String>,
    pub latest: LatestResults,
}

impl LogSummary {
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.latest.last_updated
    }

    /// Sum of every test's max score.
    pub fn max_total(&self) -> u64 {
        self.tests.iter().map(|t| u64::from(t.max_score)).sum()
    }
}

/// Reduces `rows` and collects the test columns and model list alongside.
pub fn summarize_log(rows: &[ResultLogRow]) -> LogSummary {
    let mut tests = Vec::new();
    let mut seen_tests = HashSet::new();
    let mut models = BTreeSet::new();
    for row in rows {
        let model = row.model.trim();
        let test_id = row.test_id.trim();
        if model.is_empty() || test_id.is_empty() || row.is_case_row() {
            continue;
        }
        models.insert(model.to_string());
        if seen_tests.insert(test_id.to_string()) {
            let name = row.test_name.trim();
            tests.push(TestColumn {
                id: test_id.to_string(),
                name: if name.is_empty() { test_id } else { name }.to_string(),
                max_score: row.max_score.unwrap_or(0),
            });
        }
    }
    LogSummary {
        tests,
        models: models.into_iter().collect(),
        latest: reduce_rows(rows),
    }
}
