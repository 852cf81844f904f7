use serde::{Deserialize, Serialize};

/// Where a failure happened. Narrower scopes leave the wider fields set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailureScope {
    pub model: String,
    pub test: Option<String>,
    pub case: Option<String>,
}

impl FailureScope {
    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            test: None,
            case: None,
        }
    }

    pub fn test(model: impl Into<String>, test: impl Into<String>) -> Self {
        Self {
            test: Some(test.into()),
            ..Self::model(model)
        }
    }

    pub fn case(model: impl Into<String>, test: impl Into<String>, case: impl Into<String>) -> Self {
        Self {
            case: Some(case.into()),
            ..Self::test(model, test)
        }
    }
}

impl std::fmt::Display for FailureScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = std::iter::once(self.model.as_str())
            .chain(self.test.as_deref())
            .chain(self.case.as_deref())
            .filter(|s| !s.is_empty())
            .collect();
        f.write_str(&parts.join(" / "))
    }
}

/// What went wrong outside the happy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A single model call failed; the case scored zero
    Case,
    /// The runner could not produce a result for a whole test
    Test,
    /// A result could not be written to the log
    Persist,
    /// Runtime/GPU information could not be read
    Runtime,
}

/// A structured failure event emitted by the runner for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub scope: FailureScope,
    pub message: String,
}

impl RunFailure {
    pub fn new(kind: FailureKind, scope: FailureScope, message: impl Into<String>) -> Self {
        Self {
            kind,
            scope,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.scope, self.message)
    }
}
