// 📂 File Handler - open an export and hand back a typed table
//
// Dispatches on the file extension: CSV goes through the `csv` crate after
// encoding detection, spreadsheets (xlsx/xls/ods) through calamine.

use crate::error::ImportError;
use crate::normalize::excel_serial_to_date;
use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use std::fs;
use std::path::Path;

/// Delimiters tried when the configured one does not occur in the header
const DELIMITER_CANDIDATES: &[u8] = &[b';', b',', b'\t', b'|'];

// ============================================================================
// CORE TYPES
// ============================================================================

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
    Ods,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" | "txt" => Ok(FileFormat::Csv),
            "xlsx" | "xlsm" => Ok(FileFormat::Xlsx),
            "xls" => Ok(FileFormat::Xls),
            "ods" => Ok(FileFormat::Ods),
            "json" => Ok(FileFormat::Json),
            _ => Err(ImportError::UnsupportedFormat(extension)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FileFormat::Csv => "CSV",
            FileFormat::Xlsx => "Excel (xlsx)",
            FileFormat::Xls => "Excel (xls)",
            FileFormat::Ods => "OpenDocument (ods)",
            FileFormat::Json => "BWA JSON export",
        }
    }

    pub fn is_spreadsheet(&self) -> bool {
        matches!(self, FileFormat::Xlsx | FileFormat::Xls | FileFormat::Ods)
    }
}

/// One cell of an imported table
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Cell {
    /// Text cell from raw input; blank strings become `Empty`
    pub fn text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Display form, used for raw amounts and free-text columns
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// A data row plus the line it came from (1-based, header included)
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub line: usize,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// ENCODING DETECTION
// ============================================================================

/// Fallback list, tried in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Windows1252,
    Latin1,
}

// Windows-1252 code points for 0x80..=0x9F; undefined slots map to the C1 control
const CP1252_HIGH: [char; 32] = [
    '€', '\u{81}', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '\u{8D}', 'Ž', '\u{8F}',
    '\u{90}', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ', '\u{9D}', 'ž', 'Ÿ',
];

/// Guess the encoding from byte frequencies
///
/// Valid UTF-8 wins. Otherwise bytes in 0x80..=0x9F (printable in
/// Windows-1252, control codes in Latin-1) decide between the two single
/// byte encodings.
pub fn detect_encoding(bytes: &[u8]) -> TextEncoding {
    if std::str::from_utf8(bytes).is_ok() {
        return TextEncoding::Utf8;
    }

    let c1_bytes = bytes.iter().filter(|b| (0x80..=0x9F).contains(*b)).count();
    if c1_bytes > 0 {
        TextEncoding::Windows1252
    } else {
        TextEncoding::Latin1
    }
}

pub fn decode(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => {
            let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
            String::from_utf8_lossy(bytes).into_owned()
        }
        TextEncoding::Windows1252 => bytes
            .iter()
            .map(|&b| match b {
                0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize],
                _ => b as char,
            })
            .collect(),
        TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
    }
}

// ============================================================================
// FILE HANDLER
// ============================================================================

pub struct FileHandler {
    /// Configured CSV delimiter; sniffed from the header when absent or unused
    delimiter: Option<u8>,
}

impl FileHandler {
    pub fn new(delimiter: Option<u8>) -> Self {
        FileHandler { delimiter }
    }

    /// Read a tabular file into a `Table`
    ///
    /// # Arguments
    /// * `path` - `.csv`, `.xlsx`, `.xls` or `.ods`
    /// * `sheet_name` - workbook sheet; the first sheet when `None`
    pub fn read_table(&self, path: &Path, sheet_name: Option<&str>) -> Result<Table> {
        let format = FileFormat::from_path(path)?;
        tracing::debug!(path = %path.display(), format = format.name(), "reading table");

        let table = match format {
            FileFormat::Csv => self.read_csv(path)?,
            FileFormat::Xlsx | FileFormat::Xls | FileFormat::Ods => {
                self.read_workbook(path, sheet_name)?
            }
            FileFormat::Json => {
                return Err(ImportError::UnsupportedFormat("json (not tabular)".to_string()).into())
            }
        };

        if table.is_empty() {
            return Err(ImportError::EmptyTable.into());
        }

        Ok(table)
    }

    fn read_csv(&self, path: &Path) -> Result<Table> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        let encoding = detect_encoding(&bytes);
        tracing::debug!(?encoding, "detected CSV encoding");

        let text = decode(&bytes, encoding);
        self.parse_csv_text(&text)
            .with_context(|| format!("Failed to parse CSV file: {}", path.display()))
    }

    /// Parse decoded CSV text
    pub fn parse_csv_text(&self, text: &str) -> Result<Table> {
        let header_line = text.lines().next().unwrap_or("");
        let delimiter = self.resolve_delimiter(header_line);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = result.with_context(|| format!("Failed to parse CSV line {}", index + 2))?;

            let cells: Vec<Cell> = record.iter().map(Cell::text).collect();
            if cells.iter().all(Cell::is_empty) {
                continue;
            }

            let line = record
                .position()
                .map(|p| physical_line(text, p.byte() as usize))
                .unwrap_or(index + 2);
            rows.push(TableRow { line, cells });
        }

        Ok(Table { headers, rows })
    }

    fn resolve_delimiter(&self, header_line: &str) -> u8 {
        if let Some(configured) = self.delimiter {
            if header_line.as_bytes().contains(&configured) {
                return configured;
            }
        }

        DELIMITER_CANDIDATES
            .iter()
            .copied()
            .map(|c| (c, header_line.bytes().filter(|b| *b == c).count()))
            .filter(|(_, count)| *count > 0)
            .max_by_key(|(_, count)| *count)
            .map(|(c, _)| c)
            .or(self.delimiter)
            .unwrap_or(b';')
    }

    fn read_workbook(&self, path: &Path, sheet_name: Option<&str>) -> Result<Table> {
        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("Failed to open workbook: {}", path.display()))?;

        let sheets = workbook.sheet_names().to_vec();
        let sheet = match sheet_name {
            Some(requested) => sheets
                .iter()
                .find(|s| s.as_str() == requested)
                .cloned()
                .ok_or_else(|| ImportError::UnknownSheet {
                    requested: requested.to_string(),
                    available: sheets.clone(),
                })?,
            None => sheets.first().cloned().ok_or(ImportError::EmptyTable)?,
        };

        let range = workbook
            .worksheet_range(&sheet)
            .with_context(|| format!("Failed to read sheet: {}", sheet))?;

        let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
        let mut rows_iter = range.rows().enumerate();

        // The header is the first row with any content
        let mut headers = Vec::new();
        for (_, row) in rows_iter.by_ref() {
            if row.iter().any(|c| !matches!(c, Data::Empty)) {
                headers = row.iter().map(|c| c.to_string().trim().to_string()).collect();
                break;
            }
        }

        let mut rows = Vec::new();
        for (index, row) in rows_iter {
            let cells: Vec<Cell> = row.iter().map(convert_cell).collect();
            if cells.iter().all(Cell::is_empty) {
                continue;
            }
            rows.push(TableRow {
                line: first_row + index + 1,
                cells,
            });
        }

        Ok(Table { headers, rows })
    }

    /// Sheet names of a workbook, in file order
    pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
        let workbook = open_workbook_auto(path)
            .with_context(|| format!("Failed to open workbook: {}", path.display()))?;
        Ok(workbook.sheet_names().to_vec())
    }
}

/// 1-based file line of the record starting at byte `offset`
///
/// The csv reader skips blank lines and may report the offset in front of
/// them, so leading line breaks are stepped over before counting.
fn physical_line(text: &str, offset: usize) -> usize {
    let bytes = text.as_bytes();
    let mut start = offset.min(bytes.len());
    while start < bytes.len() && matches!(bytes[start], b'\n' | b'\r') {
        start += 1;
    }
    bytes[..start].iter().filter(|b| **b == b'\n').count() + 1
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::text(s),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            excel_serial_to_date(serial)
                .map(Cell::Date)
                .unwrap_or(Cell::Number(serial))
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s),
        Data::Error(err) => {
            tracing::debug!(?err, "spreadsheet cell error");
            Cell::Empty
        }
    }
}
