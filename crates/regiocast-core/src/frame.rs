//! Typed, analysis-ready table produced by the normalizer.

use crate::error::{ForecastError, Result};
use crate::reader::{format_number, Cell, RawTable};
use chrono::NaiveDateTime;

/// Resolved semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Numeric,
    Timestamp,
    Text,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Text => "text",
        }
    }
}

/// Column storage, one variant per [`ColumnType`].
///
/// Numeric and text columns never hold missing values. Timestamp cells that
/// could not be converted stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    Text(Vec<String>),
}

impl ColumnData {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Numeric(_) => ColumnType::Numeric,
            ColumnData::Timestamp(_) => ColumnType::Timestamp,
            ColumnData::Text(_) => ColumnType::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display form of one cell; missing timestamps render as an empty string.
    pub fn display(&self, row: usize) -> String {
        match self {
            ColumnData::Numeric(v) => format_number(v[row]),
            ColumnData::Timestamp(v) => v[row]
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            ColumnData::Text(v) => v[row].clone(),
        }
    }

    /// Whether the cell carries no information once filled.
    pub(crate) fn is_blank(&self, row: usize) -> bool {
        match self {
            ColumnData::Numeric(_) => false,
            ColumnData::Timestamp(v) => v[row].is_none(),
            ColumnData::Text(v) => v[row].is_empty(),
        }
    }

    /// Keep only the rows whose mask entry is `true`.
    pub(crate) fn retain_rows(&mut self, keep: &[bool]) {
        fn retain<T>(v: &mut Vec<T>, keep: &[bool]) {
            let mut i = 0;
            v.retain(|_| {
                let k = keep[i];
                i += 1;
                k
            });
        }
        match self {
            ColumnData::Numeric(v) => retain(v, keep),
            ColumnData::Timestamp(v) => retain(v, keep),
            ColumnData::Text(v) => retain(v, keep),
        }
    }

    fn to_cell(&self, row: usize) -> Cell {
        match self {
            ColumnData::Numeric(v) => Cell::Number(v[row]),
            ColumnData::Timestamp(v) => v[row].map(Cell::DateTime).unwrap_or(Cell::Empty),
            ColumnData::Text(v) if v[row].is_empty() => Cell::Empty,
            ColumnData::Text(v) => Cell::Text(v[row].clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn column_type(&self) -> ColumnType {
        self.data.column_type()
    }
}

/// Ordered sequence of typed, equally long columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CleanedFrame {
    columns: Vec<Column>,
    n_rows: usize,
}

/// Lookup key used when an exact column name does not match.
pub fn column_key(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

impl CleanedFrame {
    /// Build a frame, checking that every column has the same length.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.data.len() != n_rows) {
            return Err(ForecastError::InvalidInput(format!(
                "Column '{}' has {} rows but expected {}",
                bad.name,
                bad.data.len(),
                n_rows
            )));
        }
        Ok(Self { columns, n_rows })
    }

    /// Build a frame from columns already known to share `n_rows`.
    pub(crate) fn from_parts(columns: Vec<Column>, n_rows: usize) -> Self {
        debug_assert!(columns.iter().all(|c| c.data.len() == n_rows));
        Self { columns, n_rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Exact-name lookup.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Exact-name lookup, then a lookup on the normalized key
    /// (lowercase, spaces replaced by underscores).
    pub fn find_column(&self, name: &str) -> Result<&Column> {
        if let Some(col) = self.column(name) {
            return Ok(col);
        }
        let key = column_key(name);
        self.columns
            .iter()
            .find(|c| column_key(&c.name) == key)
            .ok_or_else(|| ForecastError::missing_column(name, &self.column_names()))
    }

    /// Convert back into an untyped table. Feeding the result through the
    /// normalizer again yields this frame.
    pub fn to_raw(&self) -> RawTable {
        let names = self.columns.iter().map(|c| c.name.clone()).collect();
        let rows = (0..self.n_rows)
            .map(|r| self.columns.iter().map(|c| c.data.to_cell(r)).collect())
            .collect();
        RawTable::new(names, rows)
    }
}
