use std::sync::OnceLock;

use obench_types::MatchMode;
use regex::Regex;
use tracing::debug;

/// Two values closer than this are the same answer.
pub const NUMERIC_TOLERANCE: f64 = 1e-9;

const NUMERIC_TOKEN: &str = r"-?(?:[0-9]+/[0-9]+|[0-9]*\.[0-9]+|[0-9]+)";

/// The two independent checks applied to a model answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnswerScore {
    /// The expected answer appears somewhere in the output
    pub contains: bool,
    /// The output is the expected answer and nothing else
    pub exact_only: bool,
}

impl AnswerScore {
    /// Points earned: one per satisfied check.
    pub fn points(&self) -> u32 {
        u32::from(self.contains) + u32::from(self.exact_only)
    }
}

/// Scores raw model text against the expected answer.
///
/// Literal mode compares strings; numeric mode compares values and accepts simple
/// fractions on either side. Never fails: an expected value that cannot be parsed in
/// numeric mode simply never matches.
pub fn score_answer(output: &str, expected: &str, mode: MatchMode) -> AnswerScore {
    if output.is_empty() {
        return AnswerScore::default();
    }
    let score = match mode {
        MatchMode::Literal => AnswerScore {
            contains: contains_expected_answer(output, expected),
            exact_only: is_exact_answer(output, expected),
        },
        MatchMode::Numeric => score_numeric_answer(output, expected),
    };
    debug!(?mode, expected, ?score, "Scored answer");
    score
}

/// `true` when `expected` occurs in `text` with no digit immediately before or after it,
/// so `"12"` is found in `"the answer is 12."` but not in `"123"`.
pub fn contains_expected_answer(text: &str, expected: &str) -> bool {
    let pattern = format!("(?:^|[^0-9]){}(?:[^0-9]|$)", regex::escape(expected));
    Regex::new(&pattern)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

pub fn is_exact_answer(text: &str, expected: &str) -> bool {
    text.trim() == expected
}

fn score_numeric_answer(output: &str, expected: &str) -> AnswerScore {
    let Some(expected_value) = parse_numeric_value(expected) else {
        return AnswerScore::default();
    };
    let normalized = normalize_fraction_spacing(output);
    let contains = extract_numeric_tokens(&normalized)
        .into_iter()
        .any(|value| numeric_equal(value, expected_value));
    let exact_only = parse_numeric_token(normalized.trim())
        .is_some_and(|value| numeric_equal(value, expected_value));
    AnswerScore {
        contains,
        exact_only,
    }
}

/// Parses a decimal number or an `a/b` fraction. Division by zero and non-finite values
/// are unparseable.
pub fn parse_numeric_value(token: &str) -> Option<f64> {
    let normalized = normalize_fraction_spacing(token.trim());
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return None;
    }
    if let Some((numerator, denominator)) = normalized.split_once('/') {
        let numerator: f64 = numerator.trim().parse().ok()?;
        let denominator: f64 = denominator.trim().parse().ok()?;
        if !numerator.is_finite() || !denominator.is_finite() || denominator == 0.0 {
            return None;
        }
        return Some(numerator / denominator);
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses `text` only if the whole of it is a single numeric or fractional token.
pub fn parse_numeric_token(text: &str) -> Option<f64> {
    let normalized = normalize_fraction_spacing(text.trim());
    if !exact_token_regex().is_match(&normalized) {
        return None;
    }
    parse_numeric_value(&normalized)
}

/// Every numeric or fractional token in `text`, in order of appearance.
pub fn extract_numeric_tokens(text: &str) -> Vec<f64> {
    let normalized = normalize_fraction_spacing(text);
    token_regex()
        .find_iter(&normalized)
        .filter_map(|m| parse_numeric_value(m.as_str()))
        .collect()
}

/// Collapses whitespace around a slash between two digits: `"3 / 4"` becomes `"3/4"`.
pub fn normalize_fraction_spacing(text: &str) -> String {
    fraction_spacing_regex()
        .replace_all(text, "${1}/${2}")
        .into_owned()
}

pub fn numeric_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= NUMERIC_TOLERANCE
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NUMERIC_TOKEN).expect("numeric token pattern is valid"))
}

fn exact_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("^{NUMERIC_TOKEN}$")).expect("exact token pattern is valid")
    })
}

fn fraction_spacing_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9])\s*/\s*([0-9])").expect("fraction spacing pattern is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("5", "5", true, true)]
    #[case("The answer is 5.", "5", true, false)]
    #[case("15", "5", false, false)]
    #[case("  12 \n", "12", true, true)]
    #[case("123", "12", false, false)]
    #[case("-2", "-2", true, true)]
    #[case("", "5", false, false)]
    fn test_literal_scoring(
        #[case] output: &str,
        #[case] expected: &str,
        #[case] contains: bool,
        #[case] exact_only: bool,
    ) {
        let score = score_answer(output, expected, MatchMode::Literal);
        assert_eq!(score, AnswerScore { contains, exact_only });
    }

    #[rstest]
    #[case("2.5", "25/10", 2)]
    #[case("the value is 2.5 approx", "2.5", 1)]
    #[case("5/2", "2.5", 2)]
    #[case("5 / 2", "2.5", 2)]
    #[case("about 3", "2.5", 0)]
    #[case(".5", "1/2", 2)]
    #[case("-4", "-4", 2)]
    #[case("4", "1/0", 0)]
    #[case("4", "four", 0)]
    fn test_numeric_scoring(#[case] output: &str, #[case] expected: &str, #[case] points: u32) {
        assert_eq!(score_answer(output, expected, MatchMode::Numeric).points(), points);
    }

    #[test]
    fn test_literal_escapes_regex_metacharacters() {
        assert!(contains_expected_answer("result: (1+1)", "(1+1)"));
        assert!(!contains_expected_answer("result: 11", "1+1"));
    }

    #[test]
    fn test_extract_tokens_in_order() {
        assert_eq!(
            extract_numeric_tokens("first 3 / 4, then -2 and .5"),
            vec![0.75, -2.0, 0.5]
        );
    }

    #[test]
    fn test_parse_numeric_token_rejects_surrounding_text() {
        assert_eq!(parse_numeric_token(" 10 "), Some(10.0));
        assert_eq!(parse_numeric_token("10 apples"), None);
        assert_eq!(parse_numeric_token("1e3"), None);
    }
}
