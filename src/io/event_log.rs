//! Delimited event log reader
//!
//! Reads the raw table with normalized (trimmed, upper-cased) headers.
//! Cells are kept as strings; typing happens in `services::cleaning`.

use crate::domain::error::CleaningError;
use csv::{ByteRecord, ReaderBuilder, Trim};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Untyped rows of an event log
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let headers = headers.iter().map(|h| normalize_header(h)).collect();
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by normalized name
    pub fn column(&self, name: &str) -> Option<usize> {
        let name = normalize_header(name);
        self.headers.iter().position(|h| *h == name)
    }

    /// Cell value, empty string for short rows
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows[row].get(column).map(String::as_str).unwrap_or("")
    }
}

fn normalize_header(header: &str) -> String {
    header.trim_start_matches('\u{feff}').trim().to_uppercase()
}

fn read_from<R: Read>(reader: R, delimiter: u8) -> Result<RawTable, CleaningError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers: Vec<String> =
        rdr.byte_headers()?.iter().map(|h| String::from_utf8_lossy(h).into_owned()).collect();

    let mut rows = Vec::new();
    let mut record = ByteRecord::new();
    while rdr.read_byte_record(&mut record)? {
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|cell| String::from_utf8_lossy(cell).into_owned()).collect());
    }

    debug!(columns = ?headers, rows = %rows.len(), "event_log_parsed");
    Ok(RawTable::new(headers, rows))
}

/// Read an event log from a file
pub fn read_path<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<RawTable, CleaningError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let table = read_from(std::io::BufReader::new(file), delimiter)?;
    info!(path = %path.display(), rows = %table.len(), columns = ?table.headers(), "event_log_loaded");
    Ok(table)
}

/// Read an event log from an in-memory buffer (uploads)
pub fn read_bytes(bytes: &[u8], delimiter: u8) -> Result<RawTable, CleaningError> {
    read_from(bytes, delimiter)
}
