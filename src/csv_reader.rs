use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::LoaderConfig;
use crate::error::{PipelineError, Result};
use crate::table::{Row, Table};

// Reads a delimited file into a Table
// Inputs: file path, loader configuration (expected columns, null markers, delimiter)
// Outputs: Table with the original column order and raw cell text, or an error
// Key steps:
// 1. Open the file (Io error if it cannot be read)
// 2. Read the header and every record as raw strings
// 3. Map empty cells and exact null markers to None; other text is kept as is
// 4. Check that every expected column is present (Schema error otherwise)
pub fn load_table<P: AsRef<Path>>(path: P, config: &LoaderConfig) -> Result<Table> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let table = read_table(file, config)?;

    info!(
        path = %path.display(),
        rows = table.row_count(),
        columns = table.column_count(),
        "Loaded transaction table"
    );
    Ok(table)
}

pub fn read_table<R: std::io::Read>(reader: R, config: &LoaderConfig) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter_byte(config.delimiter)?)
        .has_headers(true)
        .from_reader(reader);

    let columns: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows: Vec<Row> = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| to_cell(cell, &config.null_markers))
                .collect(),
        );
    }

    let table = Table::new(columns, rows);
    table.require_columns(&config.expected_columns)?;
    debug!(kinds = ?table.kinds(), "Inferred column kinds");
    Ok(table)
}

fn to_cell(raw: &str, null_markers: &[String]) -> Option<String> {
    if raw.is_empty() || null_markers.iter().any(|m| m == raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| PipelineError::Schema(format!("delimiter {delimiter:?} is not a single ASCII character")))
}

// Writes a Table as comma-delimited text with a header row
// Rows go into a temporary file in the destination directory, which replaces
// the destination only once every row has been written. On failure the
// temporary file is dropped and nothing appears at `path`.
pub fn write_table<P: AsRef<Path>>(table: &Table, path: P) -> Result<()> {
    let path = path.as_ref();
    persist_atomically(path, |tmp| {
        let mut wtr = WriterBuilder::new().from_writer(tmp.as_file_mut());
        wtr.write_record(table.columns())?;
        for row in table.rows() {
            wtr.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }
        wtr.flush().map_err(|e| PipelineError::io(path, e))
    })?;

    info!(path = %path.display(), rows = table.row_count(), "Wrote table");
    Ok(())
}

/// Write any serializable value as pretty JSON, all-or-nothing like `write_table`
pub fn write_json<T: serde::Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<()> {
    let path = path.as_ref();
    let body = serde_json::to_string_pretty(value)?;
    persist_atomically(path, |tmp| {
        tmp.write_all(body.as_bytes())
            .map_err(|e| PipelineError::io(path, e))
    })
}

fn persist_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PipelineError::io(dir, e))?;
    write(&mut tmp)?;
    tmp.persist(path).map_err(|e| PipelineError::io(path, e.error))?;
    Ok(())
}
