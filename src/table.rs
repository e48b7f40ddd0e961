//! In-memory transaction table
//!
//! Cells keep the text they were read with; `None` marks a missing cell.
//! Numeric interpretation happens on demand so that the cleaned output can
//! be written back without reformatting any value.

use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::fmt;

pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    kinds: Vec<ColumnKind>,
    rows: Vec<Row>,
}

pub fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok()
}

impl Table {
    /// Build a table and infer each column's kind: numeric when every
    /// present cell parses as a float
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let kinds = (0..columns.len())
            .map(|col| {
                let all_numeric = rows.iter().all(|row| match row.get(col) {
                    Some(Some(cell)) => parse_number(cell).is_some(),
                    _ => true,
                });
                if all_numeric {
                    ColumnKind::Numeric
                } else {
                    ColumnKind::Categorical
                }
            })
            .collect();

        Table {
            columns,
            kinds,
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.row_count(), self.column_count())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Fail with a schema error listing every absent column
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        let mut found = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.column_index(name.as_ref()) {
                Some(idx) => found.push(idx),
                None => missing.push(name.as_ref().to_string()),
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(PipelineError::missing_columns(&missing))
        }
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        Ok(self.require_columns(&[name])?[0])
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
    }

    pub fn numeric(&self, row: usize, col: usize) -> Option<f64> {
        self.cell(row, col).and_then(parse_number)
    }

    /// Parsed values of a column that must be numeric. A present cell that
    /// does not parse is a schema error naming its data row.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let col = self.require_column(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| match row[col].as_deref() {
                None => Ok(None),
                Some(cell) => parse_number(cell).map(Some).ok_or_else(|| {
                    PipelineError::Schema(format!(
                        "column {name} must be numeric, found {cell:?} in data row {}",
                        i + 1
                    ))
                }),
            })
            .collect()
    }

    pub fn text_column(&self, name: &str) -> Result<Vec<Option<&str>>> {
        let col = self.require_column(name)?;
        Ok(self.rows.iter().map(|row| row[col].as_deref()).collect())
    }

    pub fn missing_in_row(row: &Row) -> usize {
        row.iter().filter(|c| c.is_none()).count()
    }

    /// Missing-cell count per column, in column order
    pub fn null_counts(&self) -> Vec<(String, usize)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(col, name)| {
                let nulls = self.rows.iter().filter(|row| row[col].is_none()).count();
                (name.clone(), nulls)
            })
            .collect()
    }

    /// Render the first `n` rows as an aligned text grid
    pub fn preview(&self, n: usize) -> Preview<'_> {
        Preview { table: self, n }
    }
}

pub struct Preview<'a> {
    table: &'a Table,
    n: usize,
}

impl fmt::Display for Preview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = &self.table.rows[..self.n.min(self.table.rows.len())];
        let index_width = rows.len().saturating_sub(1).to_string().len();
        let widths: Vec<usize> = self
            .table
            .columns
            .iter()
            .enumerate()
            .map(|(col, name)| {
                rows.iter()
                    .map(|row| row[col].as_deref().unwrap_or("NaN").len())
                    .chain(std::iter::once(name.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        write!(f, "{:index_width$}", "")?;
        for (name, width) in self.table.columns.iter().zip(widths.iter().copied()) {
            write!(f, "  {name:>width$}")?;
        }
        writeln!(f)?;
        for (i, row) in rows.iter().enumerate() {
            write!(f, "{i:<index_width$}")?;
            for (cell, width) in row.iter().zip(widths.iter().copied()) {
                write!(f, "  {:>width$}", cell.as_deref().unwrap_or("NaN"))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Row {
        values
            .iter()
            .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
            .collect()
    }

    #[test]
    fn test_kind_inference_ignores_missing_cells() {
        let table = Table::new(
            vec!["amount".into(), "category".into()],
            vec![cells(&["10.5", "food"]), cells(&["", "travel"]), cells(&["-3", ""])],
        );
        assert_eq!(table.kinds(), &[ColumnKind::Numeric, ColumnKind::Categorical]);
        assert_eq!(table.numeric(0, 0), Some(10.5));
        assert_eq!(table.numeric(1, 0), None);
    }

    #[test]
    fn test_require_columns_lists_all_missing() {
        let table = Table::new(vec!["amount".into()], vec![]);
        let err = table.require_columns(&["fraud", "amount", "time"]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("fraud"));
        assert!(message.contains("time"));
        assert!(!message.contains("amount"));
    }

    #[test]
    fn test_numeric_column_rejects_text() {
        let table = Table::new(vec!["amount".into()], vec![cells(&["1"]), cells(&["abc"])]);
        assert!(matches!(table.numeric_column("amount"), Err(PipelineError::Schema(_))));
    }

    #[test]
    fn test_null_counts_follow_column_order() {
        let table = Table::new(
            vec!["a".into(), "b".into()],
            vec![cells(&["", "x"]), cells(&["", ""])],
        );
        assert_eq!(table.null_counts(), vec![("a".to_string(), 2), ("b".to_string(), 1)]);
    }

    #[test]
    fn test_preview_renders_header_and_rows() {
        let table = Table::new(
            vec!["user_id".into(), "fraud".into()],
            vec![cells(&["1", "NO"]), cells(&["2", ""]), cells(&["3", "YES"])],
        );
        let text = table.preview(2).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("user_id"));
        assert!(lines[2].contains("NaN"));
    }
}
