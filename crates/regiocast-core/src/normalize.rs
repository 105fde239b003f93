//! Normalization of uploaded tables into a [`CleanedFrame`].
//!
//! Runs as separate passes so that type inference never sees filled values:
//!
//! 1. structural: drop empty rows/columns, repair the header row
//! 2. detection: decide one [`DetectedType`] per column, data untouched
//! 3. coercion: build typed columns, convert epochs, fill gaps

use crate::frame::{CleanedFrame, Column, ColumnData};
use crate::reader::{Cell, RawTable};
use chrono::{DateTime, NaiveDateTime};
use std::collections::HashSet;

/// Numeric maxima above this are read as nanoseconds since the epoch.
pub const NANOS_THRESHOLD: f64 = 1e15;
/// Numeric maxima above this (and below [`NANOS_THRESHOLD`]) are read as
/// milliseconds since the epoch.
pub const MILLIS_THRESHOLD: f64 = 1e12;

/// Normalizer settings.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Tokens that mark a row as a header row (matched case-insensitively
    /// against the alphanumeric words of each cell).
    pub header_keywords: Vec<String>,
    /// Value used for missing numeric cells.
    pub numeric_fill: f64,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            header_keywords: vec!["county".into(), "region".into(), "date".into()],
            numeric_fill: 0.0,
        }
    }
}

/// Outcome of the type detection pass for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedType {
    Numeric,
    /// Numeric column whose maximum puts it on the nanosecond epoch scale.
    EpochNanos,
    /// Numeric column whose maximum puts it on the millisecond epoch scale.
    EpochMillis,
    /// Every non-empty cell is already a calendar timestamp.
    Timestamp,
    Text,
}

/// Normalize with default options.
pub fn normalize(raw: RawTable) -> CleanedFrame {
    normalize_with(raw, &NormalizeOptions::default())
}

/// Normalize an untyped table into a typed frame.
///
/// Rows are padded to a common width first, so ragged tables are accepted.
/// When timestamp conversion leaves rows or columns blank, the result is
/// normalized again, because the header repair may judge a different first
/// row once the blank rows are gone. Every repeat removes rows or columns,
/// so the loop ends, and its result is a fixed point of this function.
pub fn normalize_with(raw: RawTable, options: &NormalizeOptions) -> CleanedFrame {
    let mut raw = RawTable::new(raw.columns, raw.rows);
    loop {
        let table = drop_empty(raw);
        let table = repair_header(table, &options.header_keywords);
        let (n_rows, n_cols) = (table.n_rows(), table.n_cols());
        let types = detect_types(&table);
        let frame = coerce(table, &types, options.numeric_fill);

        if frame.n_rows() == n_rows && frame.n_cols() == n_cols {
            tracing::debug!(
                rows = frame.n_rows(),
                cols = frame.n_cols(),
                types = ?frame.columns().iter().map(|c| c.column_type().name()).collect::<Vec<_>>(),
                "normalized table"
            );
            return frame;
        }
        tracing::debug!(
            rows = n_rows - frame.n_rows(),
            cols = n_cols - frame.n_cols(),
            "conversion emptied rows or columns, normalizing again"
        );
        raw = frame.to_raw();
    }
}

static EMPTY: Cell = Cell::Empty;

fn cell_at(row: &[Cell], j: usize) -> &Cell {
    row.get(j).unwrap_or(&EMPTY)
}

/// Drop rows and columns in which every cell is empty.
pub fn drop_empty(raw: RawTable) -> RawTable {
    let RawTable { columns, rows } = RawTable::new(raw.columns, raw.rows);

    let rows: Vec<Vec<Cell>> = rows
        .into_iter()
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .collect();

    let keep: Vec<bool> = (0..columns.len())
        .map(|j| rows.iter().any(|row| !cell_at(row, j).is_empty()))
        .collect();

    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped > 0 {
        tracing::debug!(dropped, "dropped empty columns");
    }

    let columns = select(columns, &keep);
    let rows = rows.into_iter().map(|row| select(row, &keep)).collect();
    RawTable { columns, rows }
}

fn select<T>(items: Vec<T>, keep: &[bool]) -> Vec<T> {
    items
        .into_iter()
        .zip(keep.iter())
        .filter_map(|(item, k)| if *k { Some(item) } else { None })
        .collect()
}

fn has_keyword(text: &str, keywords: &[String]) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .any(|token| keywords.iter().any(|k| token.eq_ignore_ascii_case(k)))
}

/// Promote the first data row to the header when it looks like one.
///
/// A header that already carries a keyword is left alone, which keeps the
/// repair from firing twice on the same table. Names are then made
/// non-blank and unique.
pub fn repair_header(raw: RawTable, keywords: &[String]) -> RawTable {
    let RawTable {
        mut columns,
        mut rows,
    } = raw;

    let header_ok = columns.iter().any(|c| has_keyword(c, keywords));
    let first_row_is_header = rows
        .first()
        .map(|row| row.iter().any(|c| has_keyword(&c.as_text(), keywords)))
        .unwrap_or(false);

    if !header_ok && first_row_is_header {
        let promoted = rows.remove(0);
        tracing::debug!(
            previous = ?columns,
            "promoting first data row to header"
        );
        columns = promoted.iter().map(Cell::as_text).collect();
    } else if !header_ok {
        tracing::debug!("no header keyword found; keeping supplied column names");
    }

    RawTable {
        columns: unique_names(columns),
        rows,
    }
}

fn unique_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let base = match name.trim() {
                "" => format!("column_{}", i),
                trimmed => trimmed.to_string(),
            };
            let mut candidate = base.clone();
            let mut suffix = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}.{}", base, suffix);
                suffix += 1;
            }
            candidate
        })
        .collect()
}

fn parse_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(v) if v.is_finite() => Some(*v),
        Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Decide the type of one column from its cells.
pub fn detect_column_type<'a, I>(cells: I) -> DetectedType
where
    I: IntoIterator<Item = &'a Cell>,
{
    let mut all_datetime = true;
    let mut all_numeric = true;
    let mut max = f64::NEG_INFINITY;

    for cell in cells.into_iter().filter(|c| !c.is_empty()) {
        all_datetime &= matches!(cell, Cell::DateTime(_));
        match parse_number(cell) {
            Some(v) => max = max.max(v),
            None => all_numeric = false,
        }
        if !all_datetime && !all_numeric {
            return DetectedType::Text;
        }
    }

    if all_datetime {
        DetectedType::Timestamp
    } else if max > NANOS_THRESHOLD {
        DetectedType::EpochNanos
    } else if max > MILLIS_THRESHOLD && max < NANOS_THRESHOLD {
        DetectedType::EpochMillis
    } else {
        DetectedType::Numeric
    }
}

/// Type detection pass over every column.
pub fn detect_types(raw: &RawTable) -> Vec<DetectedType> {
    (0..raw.n_cols())
        .map(|j| detect_column_type(raw.rows.iter().map(|row| cell_at(row, j))))
        .collect()
}

fn epoch_to_datetime(value: f64, detected: DetectedType) -> Option<NaiveDateTime> {
    if !value.is_finite() || value.abs() >= i64::MAX as f64 {
        return None;
    }
    let value = value as i64;
    match detected {
        DetectedType::EpochNanos => Some(DateTime::from_timestamp_nanos(value).naive_utc()),
        DetectedType::EpochMillis => DateTime::from_timestamp_millis(value).map(|dt| dt.naive_utc()),
        _ => None,
    }
}

fn coerce(raw: RawTable, types: &[DetectedType], numeric_fill: f64) -> CleanedFrame {
    let RawTable { columns: names, rows } = raw;
    let n_rows = rows.len();

    let mut columns: Vec<Column> = names
        .into_iter()
        .zip(types.iter())
        .enumerate()
        .map(|(j, (name, detected))| {
            let cells = rows.iter().map(|row| cell_at(row, j));
            let data = match detected {
                DetectedType::Numeric => ColumnData::Numeric(
                    cells
                        .map(|c| parse_number(c).unwrap_or(numeric_fill))
                        .collect(),
                ),
                DetectedType::EpochNanos | DetectedType::EpochMillis => {
                    let converted: Vec<Option<NaiveDateTime>> = cells
                        .map(|c| parse_number(c).and_then(|v| epoch_to_datetime(v, *detected)))
                        .collect();
                    tracing::debug!(column = %name, scale = ?detected, "converted epoch column");
                    ColumnData::Timestamp(converted)
                }
                DetectedType::Timestamp => ColumnData::Timestamp(
                    cells
                        .map(|c| match c {
                            Cell::DateTime(dt) => Some(*dt),
                            _ => None,
                        })
                        .collect(),
                ),
                DetectedType::Text => ColumnData::Text(cells.map(Cell::as_text).collect()),
            };
            Column::new(name, data)
        })
        .collect();

    // Timestamp conversion can leave rows or columns with nothing left in them.
    let keep_rows: Vec<bool> = (0..n_rows)
        .map(|r| columns.iter().any(|c| !c.data.is_blank(r)))
        .collect();
    let kept = keep_rows.iter().filter(|k| **k).count();
    if kept < n_rows {
        tracing::warn!(
            dropped = n_rows - kept,
            "dropping rows left blank after timestamp conversion"
        );
        for col in columns.iter_mut() {
            col.data.retain_rows(&keep_rows);
        }
    }
    columns.retain(|c| (0..kept).any(|r| !c.data.is_blank(r)));

    CleanedFrame::from_parts(columns, kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ColumnType;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn table(columns: &[&str], rows: Vec<Vec<Cell>>) -> RawTable {
        RawTable::new(columns.iter().map(|s| s.to_string()).collect(), rows)
    }

    #[test]
    fn test_drops_empty_rows_and_columns() {
        let raw = table(
            &["a", "b", "c"],
            vec![
                vec![text("1"), Cell::Empty, text("x")],
                vec![Cell::Empty, text("  "), Cell::Empty],
                vec![text("2"), Cell::Empty, text("y")],
            ],
        );
        let frame = normalize(raw);
        assert_eq!(frame.column_names(), vec!["a", "c"]);
        assert_eq!(frame.n_rows(), 2);
    }

    #[test]
    fn test_header_promoted_from_first_row() {
        let raw = table(
            &["Unnamed: 0", "Unnamed: 1", "Unnamed: 2"],
            vec![
                vec![text("County"), text("Date"), text("Cases")],
                vec![text("Nairobi"), text("2020-01-01"), text("4")],
            ],
        );
        let frame = normalize(raw);
        assert_eq!(frame.column_names(), vec!["County", "Date", "Cases"]);
        assert_eq!(frame.n_rows(), 1);
        assert_eq!(
            frame.column("Cases").unwrap().data,
            ColumnData::Numeric(vec![4.0])
        );
    }

    #[test]
    fn test_header_kept_without_keyword() {
        let raw = table(
            &["site", "value"],
            vec![vec![text("A"), text("1")], vec![text("B"), text("2")]],
        );
        let frame = normalize(raw);
        assert_eq!(frame.column_names(), vec!["site", "value"]);
        assert_eq!(frame.n_rows(), 2);
    }

    #[test]
    fn test_keyword_matches_whole_tokens_only() {
        assert!(has_keyword("date_reported", &["date".to_string()]));
        assert!(has_keyword("Nairobi County", &["county".to_string()]));
        assert!(!has_keyword("update", &["date".to_string()]));
    }

    #[test]
    fn test_duplicate_and_blank_names() {
        let names = unique_names(vec!["a".into(), "".into(), "a".into(), "a".into()]);
        assert_eq!(names, vec!["a", "column_1", "a.1", "a.2"]);
    }

    #[test]
    fn test_numeric_only_when_every_cell_parses() {
        let cells = [text("1"), text("2.5"), Cell::Empty];
        assert_eq!(detect_column_type(cells.iter()), DetectedType::Numeric);

        let cells = [text("1"), text("n/a")];
        assert_eq!(detect_column_type(cells.iter()), DetectedType::Text);

        let cells = [text("1"), text("inf")];
        assert_eq!(detect_column_type(cells.iter()), DetectedType::Text);
    }

    #[test]
    fn test_epoch_thresholds() {
        let nanos = [Cell::Number(1.0e15), Cell::Number(2.0e15)];
        assert_eq!(detect_column_type(nanos.iter()), DetectedType::EpochNanos);

        let millis = [Cell::Number(1.3e12), Cell::Number(5.0e13)];
        assert_eq!(detect_column_type(millis.iter()), DetectedType::EpochMillis);

        let plain = [Cell::Number(3.0), Cell::Number(500.0)];
        assert_eq!(detect_column_type(plain.iter()), DetectedType::Numeric);

        // exactly on a threshold stays numeric
        let edge = [Cell::Number(1.0e15)];
        assert_eq!(detect_column_type(edge.iter()), DetectedType::Numeric);
    }

    #[test]
    fn test_epoch_columns_become_timestamps() {
        let raw = table(
            &["ns", "ms", "n"],
            vec![
                vec![Cell::Number(2.0e15), Cell::Number(5.0e13), Cell::Number(500.0)],
                vec![Cell::Empty, Cell::Number(1.6e12), Cell::Empty],
            ],
        );
        let frame = normalize(raw);

        let ns = &frame.column("ns").unwrap().data;
        let expected_ns = DateTime::from_timestamp_nanos(2_000_000_000_000_000).naive_utc();
        assert_eq!(ns, &ColumnData::Timestamp(vec![Some(expected_ns), None]));

        let ms = frame.column("ms").unwrap();
        assert_eq!(ms.column_type(), ColumnType::Timestamp);
        if let ColumnData::Timestamp(values) = &ms.data {
            let expected = DateTime::from_timestamp_millis(50_000_000_000_000)
                .unwrap()
                .naive_utc();
            assert_eq!(values[0], Some(expected));
        }

        assert_eq!(
            frame.column("n").unwrap().data,
            ColumnData::Numeric(vec![500.0, 0.0])
        );
    }

    #[test]
    fn test_fills_do_not_influence_types() {
        let raw = table(
            &["county", "cases"],
            vec![
                vec![text("A"), Cell::Empty],
                vec![Cell::Empty, text("3")],
            ],
        );
        let frame = normalize(raw);
        assert_eq!(
            frame.column("county").unwrap().data,
            ColumnData::Text(vec!["A".into(), "".into()])
        );
        assert_eq!(
            frame.column("cases").unwrap().data,
            ColumnData::Numeric(vec![0.0, 3.0])
        );
    }

    #[test]
    fn test_mixed_datetime_column_is_text() {
        let dt = DateTime::from_timestamp(0, 0).unwrap().naive_utc();
        let cells = [Cell::DateTime(dt), text("soon")];
        assert_eq!(detect_column_type(cells.iter()), DetectedType::Text);
        let cells = [Cell::DateTime(dt), Cell::Empty];
        assert_eq!(detect_column_type(cells.iter()), DetectedType::Timestamp);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let dt = DateTime::from_timestamp(1_600_000_000, 0).unwrap().naive_utc();
        let raw = table(
            &["", "", "", "", ""],
            vec![
                vec![text("County"), text("Date"), text("Cases"), text("stamp"), Cell::Empty],
                vec![
                    text("Nairobi County"),
                    Cell::DateTime(dt),
                    text("4"),
                    Cell::Number(1.6e12),
                    Cell::Empty,
                ],
                vec![Cell::Empty, Cell::Empty, Cell::Empty, Cell::Empty, Cell::Empty],
                vec![
                    text("Mombasa"),
                    Cell::Empty,
                    Cell::Empty,
                    Cell::Number(1.7e12),
                    Cell::Empty,
                ],
                vec![text("Kisumu"), Cell::DateTime(dt), text("x1"), Cell::Empty, Cell::Empty],
            ],
        );

        let once = normalize(raw);
        let twice = normalize(once.to_raw());
        assert_eq!(once, twice);
        assert_eq!(once.column_names(), vec!["County", "Date", "Cases", "stamp"]);
    }

    #[test]
    fn test_idempotent_when_conversion_blanks_first_row() {
        // The out-of-range epoch in the first row converts to nothing, which
        // uncovers a header-like row underneath.
        let raw = table(
            &["a", "b"],
            vec![
                vec![Cell::Empty, Cell::Number(-1e19)],
                vec![text("date"), Cell::Number(2e15)],
                vec![text("x"), Cell::Number(2e15)],
            ],
        );

        let once = normalize(raw);
        let twice = normalize(once.to_raw());
        assert_eq!(once, twice);
        assert_eq!(once.n_rows(), 1);
        assert_eq!(once.column_names()[0], "date");
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let raw = RawTable {
            columns: vec!["county".to_string(), "cases".to_string()],
            rows: vec![vec![text("A")], vec![text("B"), text("2"), text("extra")]],
        };
        let frame = normalize(raw);
        assert_eq!(frame.n_rows(), 2);
        assert_eq!(frame.n_cols(), 3);
        assert_eq!(
            frame.column("cases").unwrap().data,
            ColumnData::Numeric(vec![0.0, 2.0])
        );

        let short = RawTable {
            columns: vec!["county".to_string(), "cases".to_string()],
            rows: vec![vec![text("A")]],
        };
        assert_eq!(drop_empty(short).rows, vec![vec![text("A")]]);
    }
}
