//! Results file location and naming
//!
//! Results live in a data directory as `results.csv` or `results-<name>.csv`. Names that
//! come from users are either sanitized (explicit file names) or slugified (run names).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

/// File used when no file or run name is given
pub const DEFAULT_RESULTS_FILE: &str = "results.csv";

/// Longest slug kept from a run name
pub const MAX_SLUG_LEN: usize = 64;

/// Where a store reads and writes its results file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsConfig {
    /// Directory holding every results file
    pub data_dir: PathBuf,
    /// File name inside `data_dir`
    pub file_name: String,
}

impl ResultsConfig {
    /// Create a configuration for the default file in `data_dir`
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            file_name: DEFAULT_RESULTS_FILE.to_string(),
        }
    }

    /// Use an explicit file name; names that fail sanitizing keep the current file
    pub fn with_file_name(mut self, name: &str) -> Self {
        if let Some(name) = sanitize_results_filename(Some(name)) {
            self.file_name = name;
        }
        self
    }

    /// Use `results-<slug>.csv` for the given run name
    pub fn with_run_name(mut self, run_name: &str) -> Self {
        if let Some(slug) = slugify_run_name(run_name) {
            self.file_name = format!("results-{slug}.csv");
        }
        self
    }

    /// Full path of the results file
    pub fn path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

fn file_name_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        RegexBuilder::new(r"^results(?:-[a-z0-9][a-z0-9._-]*)?\.csv$")
            .case_insensitive(true)
            .build()
            .ok()
    })
    .as_ref()
}

/// Reduces `name` to its final path component and accepts it only if it looks like
/// `results.csv` or `results-<name>.csv`.
pub fn sanitize_results_filename(name: Option<&str>) -> Option<String> {
    let name = name?.trim();
    if name.is_empty() {
        return None;
    }
    let base = Path::new(name).file_name()?.to_str()?;
    file_name_regex()?
        .is_match(base)
        .then(|| base.to_string())
}

/// Lower-cases `name`, collapses every run of other characters to `-`, trims dashes and
/// keeps at most [`MAX_SLUG_LEN`] characters.
pub fn slugify_run_name(name: &str) -> Option<String> {
    let text = name.trim().to_lowercase();
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        return None;
    }
    slug.truncate(MAX_SLUG_LEN);
    Some(slug)
}

/// Picks the results file name from request inputs, in priority order: an explicit valid
/// `file`, then the `run` query value, then the `run_name` from the request body.
///
/// A `run` value that slugs to nothing selects the default file rather than falling
/// through to the body's run name.
pub fn resolve_results_file(
    file: Option<&str>,
    run: Option<&str>,
    payload_run: Option<&str>,
) -> String {
    let from_run = |value: &str| slugify_run_name(value).map(|slug| format!("results-{slug}.csv"));
    let name = if let Some(name) = sanitize_results_filename(file) {
        Some(name)
    } else if let Some(run) = run {
        from_run(run)
    } else if let Some(run) = payload_run {
        from_run(run)
    } else {
        None
    };
    name.unwrap_or_else(|| DEFAULT_RESULTS_FILE.to_string())
}

/// Names of every `results*.csv` file in `dir`, sorted. A missing directory has none.
pub fn list_results_files(dir: &Path) -> std::io::Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut files: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| name.starts_with("results") && name.ends_with(".csv"))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ResultsConfig::default();
        assert_eq!(config.path(), PathBuf::from("data").join("results.csv"));
    }

    #[test]
    fn test_config_builders() {
        let config = ResultsConfig::new("/tmp/obench").with_run_name("Nightly Run #3");
        assert_eq!(config.file_name, "results-nightly-run-3.csv");

        let config = config.with_file_name("../../etc/passwd");
        assert_eq!(config.file_name, "results-nightly-run-3.csv");

        let config = config.with_file_name("results-a.csv");
        assert_eq!(config.path(), PathBuf::from("/tmp/obench/results-a.csv"));
    }
}
