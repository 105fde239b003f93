//! Loading uploaded CSV and Excel bytes into an untyped [`RawTable`].

use crate::error::{ForecastError, Result};
use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use chrono::NaiveDateTime;
use std::io::Cursor;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// A single untyped cell as it came out of the file.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Empty cells and whitespace-only text both count as missing.
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Render the cell as text, the way header sniffing and text columns see it.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(v) => format_number(*v),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Format a float without a trailing `.0` for integral values.
pub(crate) fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// Untyped rows plus the header row the file claimed to have.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    /// Build a table, padding every row and the header to a common width.
    pub fn new(mut columns: Vec<String>, mut rows: Vec<Vec<Cell>>) -> Self {
        let width = rows
            .iter()
            .map(|r| r.len())
            .chain(std::iter::once(columns.len()))
            .max()
            .unwrap_or(0);

        columns.resize(width, String::new());
        for row in rows.iter_mut() {
            row.resize(width, Cell::Empty);
        }

        Self { columns, rows }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }
}

/// Which tabular encoding the uploaded bytes use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingHint {
    Csv,
    Excel,
    /// Sniff the workbook signature, fall back to CSV.
    Auto,
}

impl EncodingHint {
    /// `.csv` files are read as CSV, everything else as a workbook.
    pub fn from_file_name(name: &str) -> Self {
        if name.to_lowercase().ends_with(".csv") {
            EncodingHint::Csv
        } else {
            EncodingHint::Excel
        }
    }
}

impl std::str::FromStr for EncodingHint {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" | "text/csv" => Ok(EncodingHint::Csv),
            "excel" | "xlsx" | "xls" | "ods" => Ok(EncodingHint::Excel),
            "" | "auto" => Ok(EncodingHint::Auto),
            other => Err(ForecastError::InvalidParameter {
                param: "encoding".to_string(),
                value: other.to_string(),
                reason: "expected csv, excel or auto".to_string(),
            }),
        }
    }
}

/// Read uploaded bytes into a [`RawTable`].
pub fn read_table(bytes: &[u8], hint: EncodingHint) -> Result<RawTable> {
    if bytes.is_empty() {
        return Err(ForecastError::UnreadableFile("file is empty".to_string()));
    }

    let hint = match hint {
        EncodingHint::Auto if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) => {
            EncodingHint::Excel
        }
        EncodingHint::Auto => EncodingHint::Csv,
        other => other,
    };

    let table = match hint {
        EncodingHint::Excel => read_excel(bytes)?,
        _ => read_csv(bytes)?,
    };

    tracing::debug!(
        rows = table.n_rows(),
        cols = table.n_cols(),
        encoding = ?hint,
        "read raw table"
    );
    Ok(table)
}

fn read_csv(bytes: &[u8]) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record?
            .iter()
            .map(|s| s.trim().to_string())
            .collect::<Vec<_>>(),
        None => return Err(ForecastError::UnreadableFile("CSV has no rows".to_string())),
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|s| {
                    if s.trim().is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(s.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(RawTable::new(header, rows))
}

fn read_excel(bytes: &[u8]) -> Result<RawTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ForecastError::UnreadableFile("workbook has no sheets".to_string()))??;

    let mut rows = range.rows();
    let header = match rows.next() {
        Some(cells) => cells.iter().map(|c| excel_cell(c).as_text()).collect(),
        None => {
            return Err(ForecastError::UnreadableFile(
                "first worksheet is empty".to_string(),
            ))
        }
    };
    let rows = rows
        .map(|cells| cells.iter().map(excel_cell).collect())
        .collect();

    Ok(RawTable::new(header, rows))
}

fn excel_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) => Cell::DateTime(dt),
            None => match cell {
                Data::DateTimeIso(s) => Cell::Text(s.clone()),
                _ => {
                    tracing::debug!("unconvertible Excel date cell treated as empty");
                    Cell::Empty
                }
            },
        },
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}
