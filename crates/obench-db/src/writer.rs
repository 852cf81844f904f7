//! Append-only CSV writer for the result log

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::types::{header_line, HeaderIndex, ResultLogRow, HEADERS};

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn is_missing_or_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
}

/// Whether the last byte of a non-empty file is a newline.
fn ends_with_newline(file: &mut fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Makes sure `path` exists and starts with the current header.
///
/// A missing or empty file gets a fresh header. A file with a different header is
/// rewritten through a temporary file, mapping old columns onto the current ones by name;
/// columns that no longer exist are dropped and new ones are left empty.
pub fn ensure_results_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::filesystem(display(parent), e))?;
    }

    if is_missing_or_empty(path) {
        fs::write(path, header_line()).map_err(|e| StoreError::filesystem(display(path), e))?;
        debug!(path = %path.display(), "Created results file");
        return Ok(());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| StoreError::csv(display(path), e))?;
    let mut existing = csv::StringRecord::new();
    let has_header = reader
        .read_record(&mut existing)
        .map_err(|e| StoreError::csv(display(path), e))?;
    if has_header && existing.iter().eq(HEADERS.iter().copied()) {
        return Ok(());
    }

    migrate_header(path, &existing)
}

fn migrate_header(path: &Path, existing: &csv::StringRecord) -> Result<()> {
    let index = HeaderIndex::new(existing);
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| StoreError::csv(display(path), e))?;
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(tmp_path)
        .map_err(|e| StoreError::csv(display(tmp_path), e))?;

    writer
        .write_record(HEADERS)
        .map_err(|e| StoreError::csv(display(tmp_path), e))?;
    let mut migrated = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| StoreError::csv(display(path), e))?;
        let mapped: Vec<&str> = HEADERS.iter().map(|h| index.get(&record, h)).collect();
        writer
            .write_record(&mapped)
            .map_err(|e| StoreError::csv(display(tmp_path), e))?;
        migrated += 1;
    }
    writer
        .flush()
        .map_err(|e| StoreError::filesystem(display(tmp_path), e))?;
    drop(writer);

    fs::rename(tmp_path, path).map_err(|e| StoreError::filesystem(display(path), e))?;
    info!(path = %path.display(), rows = migrated, "Migrated results file header");
    Ok(())
}

/// Encodes records as CSV text in header order, without a header line.
pub fn encode_records<I, R>(records: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for record in records {
        writer
            .write_record(record)
            .map_err(|e| StoreError::csv("<memory>", e))?;
    }
    writer
        .into_inner()
        .map_err(|e| StoreError::task(format!("Failed to finish CSV buffer: {e}")))
}

/// Appends raw records, already in header order, with a single write.
pub fn append_records(path: &Path, records: &[Vec<String>]) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }
    ensure_results_file(path)?;
    let mut buffer = encode_records(records.iter())?;
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::filesystem(display(path), e))?;
    // a previous write cut short leaves an unterminated line; start on a fresh one
    if !ends_with_newline(&mut file).map_err(|e| StoreError::filesystem(display(path), e))? {
        buffer.insert(0, b'\n');
    }
    file.write_all(&buffer)
        .map_err(|e| StoreError::filesystem(display(path), e))?;
    debug!(path = %path.display(), rows = records.len(), "Appended rows");
    Ok(records.len())
}

/// Appends typed rows with a single write.
pub fn append_rows(path: &Path, rows: &[ResultLogRow]) -> Result<usize> {
    let records: Vec<Vec<String>> = rows.iter().map(ResultLogRow::to_record).collect();
    append_records(path, &records)
}

/// Deletes the results file. Returns whether a file was removed.
pub fn clear_results(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Cleared results file");
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(StoreError::filesystem(display(path), err)),
    }
}

/// The raw file contents, or just the header line when the file is missing or empty.
pub fn export_csv(path: &Path) -> Result<String> {
    if is_missing_or_empty(path) {
        return Ok(header_line());
    }
    fs::read_to_string(path).map_err(|e| StoreError::filesystem(display(path), e))
}
