//! Tabular loader: turns an uploaded CSV or spreadsheet into a [`Batch`].
//!
//! Parsing is synchronous; callers in async code run it on the blocking pool.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{NaiveDate, TimeDelta};
use tracing::{debug, info};

use super::record::{Batch, MISSING};
use crate::config::UploadLimits;
use crate::error::{UploadError, ValidationError};

/// Cell contents treated as missing, in addition to blank cells.
const NULL_MARKERS: &[&str] = &[
    "#N/A", "N/A", "n/a", "NA", "NaN", "nan", "NULL", "null",
];

/// How an accepted file is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Spreadsheet,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "csv" => Some(FileKind::Csv),
            "xlsx" | "xls" => Some(FileKind::Spreadsheet),
            _ => None,
        }
    }
}

/// An uploaded file, fully buffered.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name declared by the client.
    pub filename: String,
    /// Declared size in bytes.
    pub size: u64,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            size: content.len() as u64,
            content,
        }
    }
}

/// Validates and parses roster uploads.
#[derive(Debug, Clone)]
pub struct RosterLoader {
    limits: UploadLimits,
}

impl RosterLoader {
    pub fn new(limits: UploadLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Check presence, extension and size without reading the content.
    pub fn validate(&self, file: Option<&UploadedFile>) -> Result<FileKind, ValidationError> {
        let file = match file {
            Some(f) if !f.filename.is_empty() => f,
            _ => return Err(ValidationError::MissingFile),
        };

        let extension = extension_of(&file.filename);
        let kind = FileKind::from_extension(&extension)
            .filter(|_| self.limits.allowed_extensions.contains(&extension))
            .ok_or_else(|| ValidationError::UnsupportedExtension {
                extension: extension.clone(),
                allowed: self.allowed_list(),
            })?;

        self.check_size(file.size)?;
        Ok(kind)
    }

    /// Size check alone, usable while a body is still streaming in.
    pub fn check_size(&self, size: u64) -> Result<(), ValidationError> {
        if size > self.limits.max_file_size {
            return Err(ValidationError::TooLarge {
                size,
                limit: self.limits.max_file_size,
            });
        }
        Ok(())
    }

    /// Validate then parse an upload into a batch.
    pub fn load(&self, file: Option<UploadedFile>) -> Result<Batch, UploadError> {
        let kind = self.validate(file.as_ref())?;
        let Some(file) = file else {
            return Err(ValidationError::MissingFile.into());
        };

        let (header, rows) = match kind {
            FileKind::Csv => self.read_csv(&file.content)?,
            FileKind::Spreadsheet => read_spreadsheet(file.content)?,
        };

        if rows.is_empty() {
            return Err(UploadError::EmptyData);
        }

        let width = header.len().min(self.limits.max_columns);
        let columns = normalize_header(header.into_iter().take(width));
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .take(width)
                    .map(fill_missing)
                    .collect()
            })
            .collect();

        let batch = Batch::from_rows(columns, rows);
        info!(
            filename = %file.filename,
            rows = batch.len(),
            columns = batch.columns().len(),
            "Roster file parsed"
        );
        Ok(batch)
    }

    fn allowed_list(&self) -> String {
        self.limits
            .allowed_extensions
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Read delimited text in fixed-size chunks, concatenated in file order.
    fn read_csv(&self, content: &[u8]) -> Result<(Vec<String>, Vec<Vec<String>>), UploadError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content);

        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let chunk_size = self.limits.chunk_size.max(1);
        let mut rows = Vec::new();
        let mut chunk: Vec<Vec<String>> = Vec::with_capacity(chunk_size);
        let mut chunks = 0usize;

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() > header.len() {
                return Err(UploadError::Parse(format!(
                    "Expected {} fields in line {}, saw {}",
                    header.len(),
                    line + 2,
                    record.len()
                )));
            }
            chunk.push(record.iter().map(str::to_string).collect());
            if chunk.len() == chunk_size {
                chunks += 1;
                debug!(chunk = chunks, rows = chunk.len(), "CSV chunk read");
                rows.append(&mut chunk);
            }
        }
        if !chunk.is_empty() {
            chunks += 1;
            debug!(chunk = chunks, rows = chunk.len(), "CSV chunk read");
            rows.append(&mut chunk);
        }

        Ok((header, rows))
    }
}

/// Read the first worksheet; the first row is the header.
fn read_spreadsheet(content: Vec<u8>) -> Result<(Vec<String>, Vec<Vec<String>>), UploadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| UploadError::Parse("Workbook has no worksheets".to_string()))??;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Err(UploadError::EmptyData);
    };
    let header = header_row.iter().map(cell_to_string).collect();
    let body = rows
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    Ok((header, body))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(true) => "True".to_string(),
        Data::Bool(false) => "False".to_string(),
        Data::DateTime(dt) => excel_serial_to_string(dt.as_f64()),
    }
}

/// Render an Excel serial date (days since 1899-12-30).
fn excel_serial_to_string(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return serial.to_string();
    };
    let millis = (serial * 86_400_000.0).round() as i64;
    let Some(ts) = TimeDelta::try_milliseconds(millis).and_then(|d| epoch.checked_add_signed(d))
    else {
        return serial.to_string();
    };
    if serial < 1.0 {
        ts.format("%H:%M:%S").to_string()
    } else if serial.fract() == 0.0 {
        ts.format("%Y-%m-%d").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

fn extension_of(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn fill_missing(cell: String) -> String {
    let trimmed = cell.trim();
    if trimmed.is_empty() || NULL_MARKERS.contains(&trimmed) {
        MISSING.to_string()
    } else {
        cell
    }
}

/// Name blank header cells and de-duplicate repeated names.
fn normalize_header(header: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    header
        .enumerate()
        .map(|(i, name)| {
            let name = name.trim();
            let base = if name.is_empty() {
                format!("Unnamed: {i}")
            } else {
                name.to_string()
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let unique = if *count == 0 {
                base
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            unique
        })
        .collect()
}
