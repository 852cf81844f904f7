//! Test definitions and the YAML suite loader.
//!
//! A suite is a directory of YAML files, one test per file:
//!
//! ```yaml
//! id: compound-division
//! name: Compound Division
//! match_mode: numeric
//! cases:
//!   - id: "25/5/2"
//!     prompt: "Compute: 25/5/2. Respond only with the answer in digits."
//!     expected: "2.5"
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use obench_types::{MatchMode, TestCase, CASE_MAX_SCORE};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("Test '{id}' has no cases")]
    NoCases { id: String },

    #[error("Test '{id}' must run at least once")]
    ZeroRepeats { id: String },

    #[error("Test '{id}' has an empty id or name")]
    MissingIdentity { id: String },

    #[error("Duplicate case id '{case_id}' in test '{id}'")]
    DuplicateCase { id: String, case_id: String },

    #[error("Duplicate test id '{id}' in {path}")]
    DuplicateTest { id: String, path: PathBuf },

    #[error("Failed to read benchmark file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse benchmark file {path}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A named test: a fixed list of cases run `repeat_count` times each.
///
/// Immutable once built so `max_score` always agrees with the cases and repeat count.
#[derive(Debug, Clone, PartialEq)]
pub struct TestDefinition {
    id: String,
    name: String,
    cases: Vec<TestCase>,
    repeat_count: u32,
    max_score: u32,
}

impl TestDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        cases: Vec<TestCase>,
        repeat_count: u32,
    ) -> Result<Self, BenchmarkError> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() || name.trim().is_empty() {
            return Err(BenchmarkError::MissingIdentity { id });
        }
        if cases.is_empty() {
            return Err(BenchmarkError::NoCases { id });
        }
        if repeat_count == 0 {
            return Err(BenchmarkError::ZeroRepeats { id });
        }
        let mut seen = HashSet::new();
        for case in &cases {
            if !seen.insert(case.id.as_str()) {
                return Err(BenchmarkError::DuplicateCase {
                    case_id: case.id.clone(),
                    id,
                });
            }
        }
        let max_score = CASE_MAX_SCORE
            .saturating_mul(cases.len() as u32)
            .saturating_mul(repeat_count);
        Ok(Self {
            id,
            name,
            cases,
            repeat_count,
            max_score,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name, also the key results are stored under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn min_score(&self) -> u32 {
        0
    }

    /// `2 * cases * repeat_count`
    pub fn max_score(&self) -> u32 {
        self.max_score
    }

    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    /// Total model calls one run of this test makes.
    pub fn run_count(&self) -> usize {
        self.cases.len() * self.repeat_count as usize
    }

    /// A copy of this definition with a different repeat count.
    pub fn with_repeat_count(&self, repeat_count: u32) -> Result<Self, BenchmarkError> {
        Self::new(
            self.id.clone(),
            self.name.clone(),
            self.cases.clone(),
            repeat_count,
        )
    }

    /// Whether a stored result with `max_score` was produced for this exact definition.
    pub fn is_satisfied_by(&self, max_score: Option<u32>) -> bool {
        max_score == Some(self.max_score)
    }
}

/// On-disk shape of one test file.
#[derive(Debug, Clone, Deserialize)]
pub struct TestSpec {
    pub id: String,
    pub name: String,
    /// Default comparison strategy for cases that do not set their own
    #[serde(default)]
    pub match_mode: MatchMode,
    pub cases: Vec<CaseSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseSpec {
    /// Defaults to `case-N` (1-based position) when omitted
    #[serde(default)]
    pub id: Option<String>,
    pub prompt: String,
    #[serde(deserialize_with = "scalar_as_string")]
    pub expected: String,
    #[serde(default)]
    pub match_mode: Option<MatchMode>,
}

impl TestSpec {
    pub fn into_definition(self, repeat_count: u32) -> Result<TestDefinition, BenchmarkError> {
        let default_mode = self.match_mode;
        let cases = self
            .cases
            .into_iter()
            .enumerate()
            .map(|(index, case)| TestCase {
                id: case
                    .id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| format!("case-{}", index + 1)),
                prompt: case.prompt,
                expected: case.expected,
                match_mode: case.match_mode.unwrap_or(default_mode),
            })
            .collect();
        TestDefinition::new(self.id, self.name, cases, repeat_count)
    }
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a scalar answer, found {other:?}"
        ))),
    }
}

/// Parses a single test from YAML text.
pub fn parse_test(yaml: &str, repeat_count: u32) -> Result<TestDefinition, BenchmarkError> {
    let spec: TestSpec = serde_yaml::from_str(yaml).map_err(|source| BenchmarkError::Yaml {
        path: PathBuf::from("<inline>"),
        source,
    })?;
    spec.into_definition(repeat_count)
}

/// Loads every `.yml`/`.yaml` file in `dir` as one test, ordered by file name.
pub fn load_suite(dir: &Path, repeat_count: u32) -> Result<Vec<TestDefinition>, BenchmarkError> {
    let entries = fs::read_dir(dir).map_err(|source| BenchmarkError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"))
        })
        .collect();
    paths.sort();

    let mut seen = HashSet::new();
    let mut definitions = Vec::with_capacity(paths.len());
    for path in paths {
        let content = fs::read_to_string(&path).map_err(|source| BenchmarkError::Io {
            path: path.clone(),
            source,
        })?;
        let spec: TestSpec =
            serde_yaml::from_str(&content).map_err(|source| BenchmarkError::Yaml {
                path: path.clone(),
                source,
            })?;
        if !seen.insert(spec.id.clone()) {
            return Err(BenchmarkError::DuplicateTest { id: spec.id, path });
        }
        let definition = spec.into_definition(repeat_count)?;
        debug!(
            path = %path.display(),
            test = definition.name(),
            cases = definition.case_count(),
            "Loaded test definition"
        );
        definitions.push(definition);
    }

    info!(
        dir = %dir.display(),
        tests = definitions.len(),
        repeat_count,
        "Loaded benchmark suite"
    );
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cases(n: usize) -> Vec<TestCase> {
        (0..n)
            .map(|i| TestCase::literal(format!("c{i}"), format!("p{i}"), i.to_string()))
            .collect()
    }

    #[test]
    fn test_max_score_is_two_per_case_per_repeat() {
        let def = TestDefinition::new("t", "T", cases(5), 5).unwrap();
        assert_eq!(def.max_score(), 50);
        assert_eq!(def.min_score(), 0);
        assert_eq!(def.run_count(), 25);

        let single = def.with_repeat_count(1).unwrap();
        assert_eq!(single.max_score(), 10);
        assert!(!single.is_satisfied_by(Some(50)));
        assert!(single.is_satisfied_by(Some(10)));
        assert!(!single.is_satisfied_by(None));
    }

    #[test]
    fn test_rejects_invalid_definitions() {
        assert!(matches!(
            TestDefinition::new("t", "T", vec![], 1),
            Err(BenchmarkError::NoCases { .. })
        ));
        assert!(matches!(
            TestDefinition::new("t", "T", cases(1), 0),
            Err(BenchmarkError::ZeroRepeats { .. })
        ));
        let mut dup = cases(2);
        dup[1].id = dup[0].id.clone();
        assert!(matches!(
            TestDefinition::new("t", "T", dup, 1),
            Err(BenchmarkError::DuplicateCase { .. })
        ));
    }

    #[test]
    fn test_parse_test_defaults() {
        let yaml = r#"
id: compound-division
name: Compound Division
match_mode: numeric
cases:
  - prompt: "Compute: 25/5/2."
    expected: 2.5
  - id: literal-one
    prompt: "Compute: 9/3/3."
    expected: "1"
    match_mode: literal
"#;
        let def = parse_test(yaml, 2).unwrap();
        assert_eq!(def.name(), "Compound Division");
        assert_eq!(def.cases()[0].id, "case-1");
        assert_eq!(def.cases()[0].expected, "2.5");
        assert_eq!(def.cases()[0].match_mode, MatchMode::Numeric);
        assert_eq!(def.cases()[1].match_mode, MatchMode::Literal);
        assert_eq!(def.max_score(), 8);
    }

    fn write(dir: &Path, name: &str, id: &str) {
        let yaml = format!("id: {id}\nname: {id}\ncases:\n  - prompt: p\n    expected: 1\n");
        fs::write(dir.join(name), yaml).unwrap();
    }

    #[test]
    fn test_load_suite_orders_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "02-b.yaml", "second");
        write(dir.path(), "01-a.yml", "first");
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let suite = load_suite(dir.path(), 3).unwrap();
        let ids: Vec<&str> = suite.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert_eq!(suite[0].max_score(), 6);
    }

    #[test]
    fn test_load_suite_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "01-a.yml", "same");
        write(dir.path(), "02-b.yml", "same");
        assert!(matches!(
            load_suite(dir.path(), 1),
            Err(BenchmarkError::DuplicateTest { .. })
        ));
    }
}
