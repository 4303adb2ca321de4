//! Workbook serialization.
//!
//! Spreadsheet cell mechanics live outside this crate; these writers emit the
//! planned row/column content as CSV (one file per sheet) or JSON.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::info;

use crate::export::{Sheet, Workbook};

/// Result type for writer operations.
pub type WriteResult<T> = Result<T, WriteError>;

/// Errors that can occur while writing a workbook.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to encode json: {0}")]
    Json(#[from] serde_json::Error),
}

impl WriteError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Serializes a planned workbook into files.
pub trait WorkbookWriter {
    /// Write `workbook` under `dir`, naming files from `stem`. Returns the
    /// files written.
    fn write(&self, workbook: &Workbook, dir: &Path, stem: &str) -> WriteResult<Vec<PathBuf>>;
}

/// One CSV file per sheet.
///
/// A single-sheet workbook becomes `<stem>.csv`; otherwise each sheet is
/// `<stem>_<sheet>.csv`, with `_2`, `_3`, ... appended when two sheet names
/// sanitize to the same file name. The header lands on the sheet's start row.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvWriter;

impl WorkbookWriter for CsvWriter {
    fn write(&self, workbook: &Workbook, dir: &Path, stem: &str) -> WriteResult<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|err| WriteError::io(dir, err))?;

        let mut written = Vec::with_capacity(workbook.len());
        let mut used = HashSet::new();
        for sheet in &workbook.sheets {
            let file_name = if workbook.len() == 1 {
                format!("{}.csv", stem)
            } else {
                let base = format!("{}_{}", stem, sanitize_file_name(&sheet.name));
                format!("{}.csv", claim_file_stem(&mut used, base))
            };
            let path = dir.join(file_name);
            fs::write(&path, sheet_to_csv(sheet)?).map_err(|err| WriteError::io(&path, err))?;
            info!(path = %path.display(), rows = sheet.row_count(), "wrote sheet");
            written.push(path);
        }
        Ok(written)
    }
}

/// The whole workbook as one pretty-printed `<stem>.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWriter;

impl WorkbookWriter for JsonWriter {
    fn write(&self, workbook: &Workbook, dir: &Path, stem: &str) -> WriteResult<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|err| WriteError::io(dir, err))?;

        let path = dir.join(format!("{}.json", stem));
        let json = serde_json::to_string_pretty(workbook)?;
        fs::write(&path, json).map_err(|err| WriteError::io(&path, err))?;
        info!(path = %path.display(), sheets = workbook.len(), "wrote workbook");
        Ok(vec![path])
    }
}

/// Render a sheet as CSV, preceded by `start_row - 1` blank lines.
pub fn sheet_to_csv(sheet: &Sheet) -> WriteResult<String> {
    let mut buffer = Vec::new();
    for _ in 1..sheet.start_row.max(1) {
        buffer.push(b'\n');
    }

    {
        let mut writer = csv::Writer::from_writer(&mut buffer);
        writer.write_record(&sheet.headers)?;
        for row in &sheet.rows {
            writer.write_record(row)?;
        }
        writer.flush().map_err(csv::Error::from)?;
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Default file stem for an export: `<prefix>_<yyyyMMdd_HHmmss>`, where the
/// prefix is the entity type of a single-sheet export.
pub fn default_stem(prefix: &str) -> String {
    format!("{}_{}", prefix, Local::now().format("%Y%m%d_%H%M%S"))
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// First unused of `base`, `base_2`, `base_3`, ... compared case-insensitively.
fn claim_file_stem(used: &mut HashSet<String>, base: String) -> String {
    let mut candidate = base.clone();
    let mut n = 2;
    while !used.insert(candidate.to_lowercase()) {
        candidate = format!("{}_{}", base, n);
        n += 1;
    }
    candidate
}

/// Write CSV for one sheet to any sink.
pub fn write_sheet_csv<W: Write>(sheet: &Sheet, mut sink: W) -> WriteResult<()> {
    let csv = sheet_to_csv(sheet)?;
    sink.write_all(csv.as_bytes())
        .map_err(|err| WriteError::io(Path::new("<stream>"), err))
}
