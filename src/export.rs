//! Export of harvested records: delimited table (TSV), comma-delimited CSV,
//! and a full-fidelity JSON array. Each format is written in isolation so one
//! writer's failure never blocks the others; the report records what was
//! written, how large, and what failed.

use crate::model::Record;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Byte-order mark written at the start of the TSV so spreadsheet tools
/// detect UTF-8.
const UTF8_BOM: &str = "\u{feff}";

/// Errors from one format writer.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write output: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize output: {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One successfully written artifact.
#[derive(Debug)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub bytes: u64,
}

/// One format that failed; the error is kept for reporting, not raised.
#[derive(Debug)]
pub struct ExportFailure {
    pub path: PathBuf,
    pub error: ExportError,
}

/// Outcome of one export call: counts, written files, and isolated failures.
#[derive(Debug)]
pub struct ExportReport {
    pub record_count: usize,
    pub column_count: usize,
    pub files: Vec<ExportedFile>,
    pub failures: Vec<ExportFailure>,
    /// True when the input was empty; no files are written in that case.
    pub no_data: bool,
}

/// Union of all keys across `records`, in first-seen order. A record missing
/// a column yields an empty cell for it.
pub fn column_union(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// Render one cell. Strings pass through unquoted, scalars via their JSON
/// text, nested values as compact JSON, absent/null as empty.
pub(crate) fn cell_text(record: &Record, column: &str) -> String {
    match record.get(column) {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Write the delimited table: single header row, then one row per record.
/// Tabs and newlines inside a cell would corrupt the table, so they are
/// replaced with spaces. Returns the byte size of the written file.
pub fn write_tsv(records: &[Record], columns: &[String], path: &Path) -> Result<u64, ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let f = File::create(path).map_err(io_err)?;
    let mut w = BufWriter::new(f);
    write!(w, "{}", UTF8_BOM).map_err(io_err)?;
    writeln!(w, "{}", columns.join("\t")).map_err(io_err)?;
    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|c| sanitize_flat(&cell_text(record, c)))
            .collect();
        writeln!(w, "{}", row.join("\t")).map_err(io_err)?;
    }
    w.flush().map_err(io_err)?;
    file_size(path)
}

/// Write the comma-delimited table with RFC 4180 quoting: cells containing a
/// comma, quote, or newline are wrapped in quotes with inner quotes doubled.
pub fn write_csv(records: &[Record], columns: &[String], path: &Path) -> Result<u64, ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let f = File::create(path).map_err(io_err)?;
    let mut w = BufWriter::new(f);
    let header: Vec<String> = columns.iter().map(|c| csv_quote(c)).collect();
    writeln!(w, "{}", header.join(",")).map_err(io_err)?;
    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|c| csv_quote(&cell_text(record, c)))
            .collect();
        writeln!(w, "{}", row.join(",")).map_err(io_err)?;
    }
    w.flush().map_err(io_err)?;
    file_size(path)
}

/// Write the full untruncated record array as pretty-printed JSON.
pub fn write_json(records: &[Record], path: &Path) -> Result<u64, ExportError> {
    let f = File::create(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, records).map_err(|source| ExportError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    w.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    file_size(path)
}

fn sanitize_flat(s: &str) -> String {
    if s.contains(['\t', '\n', '\r']) {
        s.replace(['\t', '\n', '\r'], " ")
    } else {
        s.to_string()
    }
}

fn csv_quote(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn file_size(path: &Path) -> Result<u64, ExportError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Export `records` to `{base}.tsv`, `{base}.json`, and `{base}.csv`.
///
/// Formats are independent: a failure is captured in the report and the
/// remaining formats are still written. An empty record set produces a
/// no-data report and writes nothing.
pub fn export(records: &[Record], base: &Path) -> ExportReport {
    if records.is_empty() {
        return ExportReport {
            record_count: 0,
            column_count: 0,
            files: Vec::new(),
            failures: Vec::new(),
            no_data: true,
        };
    }

    let columns = column_union(records);
    let mut report = ExportReport {
        record_count: records.len(),
        column_count: columns.len(),
        files: Vec::new(),
        failures: Vec::new(),
        no_data: false,
    };

    let mut record_result = |path: PathBuf, result: Result<u64, ExportError>| match result {
        Ok(bytes) => report.files.push(ExportedFile { path, bytes }),
        Err(error) => report.failures.push(ExportFailure { path, error }),
    };

    let tsv = base.with_extension("tsv");
    record_result(tsv.clone(), write_tsv(records, &columns, &tsv));
    let json = base.with_extension("json");
    record_result(json.clone(), write_json(records, &json));
    let csv = base.with_extension("csv");
    record_result(csv.clone(), write_csv(records, &columns, &csv));

    report
}
