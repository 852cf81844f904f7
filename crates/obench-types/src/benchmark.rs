use serde::{Deserialize, Serialize};

/// How a model's answer is compared against the expected value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Substring match bounded by non-digits, plus a byte-for-byte exact match.
    #[default]
    Literal,
    /// Value equality within a small tolerance, with `a/b` fraction support.
    Numeric,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Literal => "literal",
            MatchMode::Numeric => "numeric",
        }
    }
}

impl std::fmt::Display for MatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "literal" => Ok(MatchMode::Literal),
            "numeric" => Ok(MatchMode::Numeric),
            _ => Err(format!("Invalid match mode: {s}")),
        }
    }
}

/// One prompt/expected-answer pair within a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Case identifier, unique within its test (e.g. `"16+32"`)
    pub id: String,
    /// Prompt sent verbatim to the model
    pub prompt: String,
    /// Canonical correct answer
    pub expected: String,
    /// Comparison strategy for this case
    #[serde(default)]
    pub match_mode: MatchMode,
}

impl TestCase {
    /// Create a literal-mode case
    pub fn literal(id: impl Into<String>, prompt: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            expected: expected.into(),
            match_mode: MatchMode::Literal,
        }
    }

    /// Create a numeric-mode case
    pub fn numeric(id: impl Into<String>, prompt: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            match_mode: MatchMode::Numeric,
            ..Self::literal(id, prompt, expected)
        }
    }
}
