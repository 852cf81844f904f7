use chrono::{TimeZone, Utc};
use obench_db::{
    append_records, append_rows, clear_results, ensure_results_file, export_csv, header_line,
    read_rows, rows_from_result, ResultLogRow, RowContext, HEADERS,
};
use obench_types::{CaseResult, Stats, TestResult};
use tempfile::TempDir;

fn sample_result() -> TestResult {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let case = |id: &str, score: u32, output: &str, error: Option<&str>| CaseResult {
        case_id: id.to_string(),
        prompt: "Compute: 1+1, \"quickly\".".to_string(),
        expected: "2".to_string(),
        score,
        max_score: 2,
        output: output.to_string(),
        error: error.map(str::to_string),
        completed_at: at,
        stats: Stats {
            eval_count: Some(4),
            eval_duration: Some(2_000_000_000),
            ..Stats::default()
        },
    };
    TestResult {
        score: 2,
        max_score: 4,
        output: "1+1 #1: 2\n---\n3+2 #1: error: Empty response".to_string(),
        completed_at: at,
        case_results: vec![
            case("1+1 #1", 2, "2", None),
            case("3+2 #1", 0, "", Some("Empty response")),
        ],
        stats: Stats {
            eval_count: Some(4),
            eval_duration: Some(2_000_000_000),
            ..Stats::default()
        },
        avg_prompt_tokens_per_second: None,
        avg_eval_tokens_per_second: Some(2.0),
        error: None,
    }
}

fn context() -> RowContext {
    RowContext {
        model: "llama3:8b".to_string(),
        model_size_bytes: Some(4_700_000_000),
        model_param_b: Some(8.0),
        test_id: "simple-addition".to_string(),
        test_name: "Simple Addition".to_string(),
    }
}

#[test]
fn test_rows_from_result_layout() {
    let rows = rows_from_result(&context(), &sample_result());
    assert_eq!(rows.len(), 3);
    assert!(!rows[0].is_case_row());
    assert_eq!(rows[0].score, Some(2));
    assert_eq!(rows[0].max_score, Some(4));
    assert_eq!(rows[0].timestamp, "2024-05-01T10:00:00.000Z");
    assert_eq!(rows[0].eval_tokens_per_second, Some(2.0));
    assert_eq!(rows[1].case_id, "1+1 #1");
    assert_eq!(rows[1].max_score, Some(2));
    assert_eq!(rows[2].error.as_deref(), Some("Empty response"));
    assert_eq!(rows[0].to_record().len(), HEADERS.len());
}

#[test]
fn test_append_then_read_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("results.csv");
    let rows = rows_from_result(&context(), &sample_result());

    assert_eq!(append_rows(&path, &rows).unwrap(), 3);
    assert_eq!(append_rows(&path, &rows[..1]).unwrap(), 1);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with(&header_line()));
    assert_eq!(contents.matches(&header_line()).count(), 1);

    let read = read_rows(&path).unwrap();
    assert_eq!(read.len(), 4);
    assert_eq!(read[0], rows[0]);
    assert_eq!(read[1].case_prompt, "Compute: 1+1, \"quickly\".");
    assert_eq!(read[0].output, rows[0].output);
}

#[test]
fn test_missing_file_reads_empty_and_exports_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    assert!(read_rows(&path).unwrap().is_empty());
    assert_eq!(export_csv(&path).unwrap(), header_line());
    assert!(!clear_results(&path).unwrap());
}

#[test]
fn test_header_migration_maps_columns_by_name() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    std::fs::write(
        &path,
        "timestamp,model,test_id,test_name,case_id,score,max_score,output,legacy\n\
         2024-05-01T10:00:00Z,m1,add,Simple Addition,,7,10,\"a, b\",dropped\n",
    )
    .unwrap();

    ensure_results_file(&path).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with(&header_line()));
    assert!(!contents.contains("dropped"));
    assert!(!dir.path().join("results.csv.tmp").exists());

    let rows = read_rows(&path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].model, "m1");
    assert_eq!(rows[0].score, Some(7));
    assert_eq!(rows[0].output, "a, b");
    assert_eq!(rows[0].model_size_bytes, None);

    // Appending after migration keeps both generations readable.
    let row = ResultLogRow {
        model: "m2".to_string(),
        test_id: "add".to_string(),
        ..ResultLogRow::default()
    };
    append_rows(&path, &[row]).unwrap();
    assert_eq!(read_rows(&path).unwrap().len(), 2);
}

#[test]
fn test_append_after_unterminated_line_starts_a_new_row() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    let rows = rows_from_result(&context(), &sample_result());
    append_rows(&path, &rows[..1]).unwrap();

    // Simulate an interrupted append that left a partial line behind.
    let mut contents = std::fs::read_to_string(&path).unwrap();
    contents.push_str("2024-05-02T10:00:00.000Z,llama3:8b,,,simple-addition");
    std::fs::write(&path, contents).unwrap();

    append_rows(&path, &rows[..1]).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("simple-addition\n"));
    assert!(contents.ends_with('\n'));

    let read = read_rows(&path).unwrap();
    assert_eq!(read.len(), 2);
    assert_eq!(read[0], rows[0]);
    assert_eq!(read[1], rows[0]);
}

#[test]
fn test_raw_records_and_clear() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results-run.csv");
    let mut record = vec![String::new(); HEADERS.len()];
    record[1] = "m1".to_string();
    record[4] = "add".to_string();
    record[9] = "3".to_string();
    assert_eq!(append_records(&path, &[record]).unwrap(), 1);
    assert_eq!(append_records(&path, &[]).unwrap(), 0);
    assert_eq!(read_rows(&path).unwrap()[0].score, Some(3));

    assert!(clear_results(&path).unwrap());
    assert!(!path.exists());
}
