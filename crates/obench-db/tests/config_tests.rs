use obench_db::{list_results_files, resolve_results_file, sanitize_results_filename, slugify_run_name};
use rstest::rstest;
use tempfile::TempDir;

#[rstest]
#[case(Some("results.csv"), Some("results.csv"))]
#[case(Some("Results-Nightly_1.CSV"), Some("Results-Nightly_1.CSV"))]
#[case(Some("../../results-a.b.csv"), Some("results-a.b.csv"))]
#[case(Some("results-.csv"), None)]
#[case(Some("results-_x.csv"), None)]
#[case(Some("passwd"), None)]
#[case(Some("  "), None)]
#[case(None, None)]
fn test_sanitize_results_filename(#[case] input: Option<&str>, #[case] expected: Option<&str>) {
    assert_eq!(sanitize_results_filename(input).as_deref(), expected);
}

#[rstest]
#[case("Nightly Run", Some("nightly-run"))]
#[case("  --Qwen 2.5 / 7B--  ", Some("qwen-2-5-7b"))]
#[case("!!!", None)]
#[case("", None)]
fn test_slugify_run_name(#[case] input: &str, #[case] expected: Option<&str>) {
    assert_eq!(slugify_run_name(input).as_deref(), expected);
}

#[test]
fn test_slug_is_capped() {
    let slug = slugify_run_name(&"a".repeat(100)).unwrap();
    assert_eq!(slug.len(), 64);
}

#[rstest]
#[case(Some("results-x.csv"), Some("run"), None, "results-x.csv")]
#[case(Some("evil.txt"), Some("My Run"), None, "results-my-run.csv")]
#[case(None, None, Some("body run"), "results-body-run.csv")]
#[case(None, Some("???"), Some("body run"), "results.csv")]
#[case(None, None, None, "results.csv")]
fn test_resolve_results_file(
    #[case] file: Option<&str>,
    #[case] run: Option<&str>,
    #[case] payload_run: Option<&str>,
    #[case] expected: &str,
) {
    assert_eq!(resolve_results_file(file, run, payload_run), expected);
}

#[test]
fn test_list_results_files() {
    let dir = TempDir::new().unwrap();
    for name in ["results-b.csv", "results.csv", "other.csv", "results-a.txt"] {
        std::fs::write(dir.path().join(name), "").unwrap();
    }
    assert_eq!(
        list_results_files(dir.path()).unwrap(),
        vec!["results-b.csv".to_string(), "results.csv".to_string()]
    );
    assert!(list_results_files(&dir.path().join("missing")).unwrap().is_empty());
}
