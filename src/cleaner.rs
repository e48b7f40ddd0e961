//! Transaction cleaning
//!
//! A raw table passes through a fixed sequence of steps, each consuming the
//! table it is given and returning the next one:
//!
//! 1. label normalization (`0`/`1` to `NO`/`YES`)
//! 2. exact-duplicate removal
//! 3. missing-value thresholding
//! 4. negative-value scan (detection only, rows are never altered)
//!
//! The counts gathered along the way form a [`CleaningReport`].

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::CleanerConfig;
use crate::error::{PipelineError, Result};
use crate::stats::Describe;
use crate::table::{parse_number, ColumnKind, Row, Table};

pub const FRAUD: &str = "fraud";
pub const AMOUNT: &str = "amount";
pub const DEVICE_ID: &str = "device_id";
pub const TIME: &str = "time";

pub const LABEL_NO: &str = "NO";
pub const LABEL_YES: &str = "YES";

/// Canonical form of a raw fraud label, or `None` when it is outside
/// `{0, 1, NO, YES}`
pub fn canonical_label(raw: &str) -> Option<&'static str> {
    let raw = raw.trim();
    match raw {
        LABEL_NO => return Some(LABEL_NO),
        LABEL_YES => return Some(LABEL_YES),
        _ => {}
    }
    match parse_number(raw) {
        Some(v) if v == 0.0 => Some(LABEL_NO),
        Some(v) if v == 1.0 => Some(LABEL_YES),
        _ => None,
    }
}

/// Rewrite the fraud column to `NO`/`YES`. Missing labels stay missing;
/// anything else unrecognized aborts the run.
pub fn normalize_labels(table: Table) -> Result<Table> {
    let fraud = table.require_column(FRAUD)?;
    let columns = table.columns().to_vec();
    let mut rows = table.into_rows();

    for (i, row) in rows.iter_mut().enumerate() {
        if let Some(raw) = row[fraud].as_deref() {
            let label = canonical_label(raw).ok_or_else(|| PipelineError::UnrecognizedLabel {
                row: i + 1,
                value: raw.to_string(),
            })?;
            row[fraud] = Some(label.to_string());
        }
    }

    Ok(Table::new(columns, rows))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CellKey {
    Missing,
    Number(u64),
    Text(String),
}

// Numeric columns compare by value so that `10` and `10.0` collide;
// everything else compares by its exact text
fn row_key(row: &Row, kinds: &[ColumnKind]) -> Vec<CellKey> {
    row.iter()
        .zip(kinds)
        .map(|(cell, kind)| match cell.as_deref() {
            None => CellKey::Missing,
            Some(text) => match (kind, parse_number(text)) {
                (ColumnKind::Numeric, Some(v)) => {
                    // fold -0.0 into 0.0
                    let v = if v == 0.0 { 0.0 } else { v };
                    CellKey::Number(v.to_bits())
                }
                _ => CellKey::Text(text.to_string()),
            },
        })
        .collect()
}

/// Number of rows that repeat an earlier row across every column
pub fn count_duplicates(table: &Table) -> usize {
    let mut seen = HashSet::with_capacity(table.row_count());
    table
        .rows()
        .iter()
        .filter(|row| !seen.insert(row_key(row, table.kinds())))
        .count()
}

/// Keep the first occurrence of every distinct row, in original order.
/// Returns the table and the number of rows removed.
pub fn remove_duplicates(table: Table) -> (Table, usize) {
    let before = table.row_count();
    let kinds = table.kinds().to_vec();
    let columns = table.columns().to_vec();

    let mut seen = HashSet::with_capacity(before);
    let rows: Vec<Row> = table
        .into_rows()
        .into_iter()
        .filter(|row| seen.insert(row_key(row, &kinds)))
        .collect();

    let removed = before - rows.len();
    (Table::new(columns, rows), removed)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SparseRowStats {
    /// Every row removed by this step
    pub dropped: usize,
    /// Of those, rows whose fraud label was missing
    pub missing_label: usize,
}

/// Keep a row while it has at least `column_count - tolerance` present
/// cells and a fraud label
pub fn drop_sparse_rows(table: Table, tolerance: usize) -> Result<(Table, SparseRowStats)> {
    let fraud = table.require_column(FRAUD)?;
    let min_present = table.column_count().saturating_sub(tolerance);
    let columns = table.columns().to_vec();

    let mut stats = SparseRowStats::default();
    let mut kept = Vec::with_capacity(table.row_count());
    for row in table.into_rows() {
        let present = row.len() - Table::missing_in_row(&row);
        let has_label = row[fraud].is_some();
        if present >= min_present && has_label {
            kept.push(row);
        } else {
            stats.dropped += 1;
            if !has_label {
                stats.missing_label += 1;
            }
        }
    }

    Ok((Table::new(columns, kept), stats))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NegativeValueScan {
    pub negative_amount_rows: usize,
    /// The offending rows, unchanged, for manual review
    pub negative_amount_examples: Vec<Row>,
    pub negative_device_rows: usize,
}

// Negative amounts could be refunds or sentinels; they are reported, not fixed
pub fn scan_negative_values(table: &Table) -> Result<NegativeValueScan> {
    let amounts = table.numeric_column(AMOUNT)?;
    let devices = table.numeric_column(DEVICE_ID)?;

    let mut scan = NegativeValueScan::default();
    for (row, amount) in table.rows().iter().zip(&amounts) {
        if matches!(amount, Some(v) if *v < 0.0) {
            scan.negative_amount_rows += 1;
            scan.negative_amount_examples.push(row.clone());
        }
    }
    scan.negative_device_rows = devices
        .iter()
        .filter(|d| matches!(d, Some(v) if *v < 0.0))
        .count();

    if scan.negative_amount_rows > 0 {
        warn!(rows = scan.negative_amount_rows, "Found rows with negative amounts");
    }
    if scan.negative_device_rows > 0 {
        warn!(rows = scan.negative_device_rows, "Found rows with negative device IDs");
    }
    Ok(scan)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnNulls {
    pub column: String,
    pub nulls: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningReport {
    pub rows_loaded: usize,
    pub duplicates_removed: usize,
    /// Duplicates remaining after removal; zero by construction
    pub duplicates_after: usize,
    /// Missing cells per column, counted after deduplication
    pub null_counts_by_column: Vec<ColumnNulls>,
    pub rows_dropped_for_missing: usize,
    pub rows_missing_label: usize,
    pub negative_amount_rows: usize,
    pub negative_amount_examples: Vec<Row>,
    pub negative_device_rows: usize,
    pub rows_retained: usize,
    pub columns: usize,
    pub time_summary: Option<Describe>,
}

#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub table: Table,
    pub report: CleaningReport,
}

// Runs the full cleaning sequence
// Inputs: raw table (consumed), cleaning policy
// Outputs: cleaned table and its diagnostic report
// Key steps:
// 1. Verify the required columns exist and numeric ones hold numbers
// 2. Normalize labels, remove duplicates, count nulls
// 3. Drop rows beyond the missing-value tolerance
// 4. Scan for negative amounts and device IDs
// 5. Summarize the time column
pub fn clean(table: Table, config: &CleanerConfig) -> Result<CleanOutcome> {
    table.require_columns(&config.required_columns)?;
    for column in [AMOUNT, DEVICE_ID, TIME] {
        table.numeric_column(column)?;
    }

    let rows_loaded = table.row_count();
    let table = normalize_labels(table)?;

    let duplicates_before = count_duplicates(&table);
    info!(duplicates = duplicates_before, "Duplicates before cleaning");
    let (table, duplicates_removed) = remove_duplicates(table);
    let duplicates_after = count_duplicates(&table);
    info!(duplicates = duplicates_after, "Duplicates after cleaning");

    let null_counts_by_column: Vec<ColumnNulls> = table
        .null_counts()
        .into_iter()
        .map(|(column, nulls)| ColumnNulls { column, nulls })
        .collect();

    let (table, sparse) = drop_sparse_rows(table, config.missing_tolerance)?;
    info!(
        dropped = sparse.dropped,
        missing_label = sparse.missing_label,
        tolerance = config.missing_tolerance,
        "Dropped rows over the missing-value tolerance"
    );

    let scan = scan_negative_values(&table)?;

    let times: Vec<f64> = table.numeric_column(TIME)?.into_iter().flatten().collect();
    let time_summary = Describe::compute(&times);

    let report = CleaningReport {
        rows_loaded,
        duplicates_removed,
        duplicates_after,
        null_counts_by_column,
        rows_dropped_for_missing: sparse.dropped,
        rows_missing_label: sparse.missing_label,
        negative_amount_rows: scan.negative_amount_rows,
        negative_amount_examples: scan.negative_amount_examples,
        negative_device_rows: scan.negative_device_rows,
        rows_retained: table.row_count(),
        columns: table.column_count(),
        time_summary,
    };
    info!(
        rows = report.rows_retained,
        columns = report.columns,
        "Cleaned dataset shape"
    );

    Ok(CleanOutcome { table, report })
}

impl fmt::Display for CleaningReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Duplicates before cleaning: {}", self.duplicates_removed)?;
        writeln!(f, "Duplicates after cleaning: {}", self.duplicates_after)?;

        writeln!(f, "\nNull values by column:")?;
        let width = self
            .null_counts_by_column
            .iter()
            .map(|c| c.column.len())
            .max()
            .unwrap_or(0);
        for c in &self.null_counts_by_column {
            writeln!(f, "{:<width$}  {}", c.column, c.nulls)?;
        }
        writeln!(
            f,
            "\nRows dropped for missing values: {} ({} without a fraud label)",
            self.rows_dropped_for_missing, self.rows_missing_label
        )?;

        if self.negative_amount_rows > 0 {
            writeln!(
                f,
                "\nWarning: Found {} rows with negative amounts",
                self.negative_amount_rows
            )?;
            for row in &self.negative_amount_examples {
                let cells: Vec<&str> = row.iter().map(|c| c.as_deref().unwrap_or("NaN")).collect();
                writeln!(f, "  {}", cells.join(", "))?;
            }
        }
        if self.negative_device_rows > 0 {
            writeln!(
                f,
                "\nWarning: Found {} rows with negative device IDs",
                self.negative_device_rows
            )?;
        }

        write!(
            f,
            "\nCleaned dataset shape: ({}, {})",
            self.rows_retained, self.columns
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> Table {
        Table::new(
            ["user_id", "device_id", "amount", "time", "payment_method", "category", "fraud"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                        .collect()
                })
                .collect(),
        )
    }

    fn labels(table: &Table) -> Vec<Option<&str>> {
        table.text_column(FRAUD).unwrap()
    }

    #[test]
    fn test_canonical_label_domain() {
        assert_eq!(canonical_label("0"), Some("NO"));
        assert_eq!(canonical_label("1.0"), Some("YES"));
        assert_eq!(canonical_label(" YES "), Some("YES"));
        assert_eq!(canonical_label("2"), None);
        assert_eq!(canonical_label("yes"), None);
        assert_eq!(canonical_label("true"), None);
    }

    #[test]
    fn test_normalize_labels_is_idempotent() {
        let raw = table(&[
            &["1", "1", "10", "0", "card", "food", "0"],
            &["2", "1", "10", "0", "card", "food", "1"],
            &["3", "1", "10", "0", "card", "food", ""],
        ]);
        let once = normalize_labels(raw).unwrap();
        let twice = normalize_labels(once.clone()).unwrap();
        assert_eq!(labels(&once), vec![Some("NO"), Some("YES"), None]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unrecognized_label_reports_row() {
        let raw = table(&[
            &["1", "1", "10", "0", "card", "food", "0"],
            &["2", "1", "10", "0", "card", "food", "2"],
        ]);
        match normalize_labels(raw) {
            Err(PipelineError::UnrecognizedLabel { row, value }) => {
                assert_eq!(row, 2);
                assert_eq!(value, "2");
            }
            other => panic!("expected unrecognized label, got {other:?}"),
        }
    }

    #[test]
    fn test_remove_duplicates_keeps_first_and_compares_numbers_by_value() {
        let raw = table(&[
            &["1", "1", "10", "0", "card", "food", "NO"],
            &["2", "1", "10", "0", "card", "food", "NO"],
            &["1", "1", "10.0", "0", "card", "food", "NO"],
            &["1", "1", "10", "0", "card", "", "NO"],
            &["1", "1", "10", "0", "card", "", "NO"],
        ]);
        let (deduped, removed) = remove_duplicates(raw);
        assert_eq!(removed, 2);
        assert_eq!(deduped.row_count(), 3);
        assert_eq!(deduped.cell(0, 0), Some("1"));
        assert_eq!(deduped.cell(1, 0), Some("2"));
        assert_eq!(deduped.cell(2, 5), None);
        assert_eq!(count_duplicates(&deduped), 0);
    }

    #[test]
    fn test_remove_duplicates_compares_text_exactly() {
        let raw = table(&[
            &["1", "1", "10", "0", "card", "food", "0"],
            &["1", "1", "10", "0", " card", "food", "0"],
            &["1", "1", "10", "0", "Card", "food", "0"],
        ]);
        let outcome = clean(raw, &CleanerConfig::default()).unwrap();
        assert_eq!(outcome.report.duplicates_removed, 0);
        assert_eq!(outcome.report.rows_retained, 3);
        assert_eq!(outcome.table.cell(1, 4), Some(" card"));
    }

    #[test]
    fn test_missing_threshold_boundary() {
        // seven columns, tolerance three: three missing cells stay, four go
        let raw = table(&[
            &["1", "", "", "", "card", "food", "NO"],
            &["2", "", "", "", "", "food", "NO"],
        ]);
        let (kept, stats) = drop_sparse_rows(raw, 3).unwrap();
        assert_eq!(kept.row_count(), 1);
        assert_eq!(kept.cell(0, 0), Some("1"));
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.missing_label, 0);
    }

    #[test]
    fn test_tolerance_is_configurable() {
        let raw = table(&[
            &["1", "1", "10", "0", "card", "", "NO"],
            &["2", "1", "10", "0", "card", "food", "YES"],
        ]);
        let (kept, stats) = drop_sparse_rows(raw, 0).unwrap();
        assert_eq!(kept.row_count(), 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_missing_label_rows_are_dropped() {
        let raw = table(&[&["1", "1", "10", "0", "card", "food", ""]]);
        let (kept, stats) = drop_sparse_rows(raw, 3).unwrap();
        assert!(kept.is_empty());
        assert_eq!(stats, SparseRowStats { dropped: 1, missing_label: 1 });
    }

    #[test]
    fn test_negative_scan_is_non_destructive() {
        let raw = table(&[
            &["1", "-1", "-5.00", "0", "card", "food", "NO"],
            &["2", "1", "10", "0", "card", "food", "YES"],
            &["3", "-2", "", "0", "card", "food", "YES"],
        ]);
        let scan = scan_negative_values(&raw).unwrap();
        assert_eq!(scan.negative_amount_rows, 1);
        assert_eq!(scan.negative_device_rows, 2);
        assert_eq!(scan.negative_amount_examples[0][2].as_deref(), Some("-5.00"));
    }

    #[test]
    fn test_clean_requires_columns() {
        let raw = Table::new(vec!["amount".into(), "time".into()], vec![]);
        let err = clean(raw, &CleanerConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_clean_rejects_text_amounts() {
        let raw = table(&[&["1", "1", "ten", "0", "card", "food", "0"]]);
        let err = clean(raw, &CleanerConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_clean_report_counts() {
        let raw = table(&[
            &["1", "1", "10", "3600", "card", "food", "0"],
            &["1", "1", "10", "3600", "card", "food", "0"],
            &["2", "", "", "", "", "food", "1"],
            &["3", "-4", "-2", "7200", "wallet", "", "1"],
            &["4", "", "", "", "wallet", "travel", "1"],
        ]);
        let outcome = clean(raw, &CleanerConfig::default()).unwrap();
        let report = &outcome.report;

        assert_eq!(report.rows_loaded, 5);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.duplicates_after, 0);
        assert_eq!(report.rows_dropped_for_missing, 1);
        assert_eq!(report.rows_retained, 3);
        let nulls = |column: &str| {
            report
                .null_counts_by_column
                .iter()
                .find(|c| c.column == column)
                .map(|c| c.nulls)
        };
        assert_eq!(nulls("amount"), Some(2));
        assert_eq!(nulls("category"), Some(1));
        assert_eq!(report.negative_amount_rows, 1);
        assert_eq!(report.negative_device_rows, 1);
        assert_eq!(report.time_summary.as_ref().map(|d| d.count), Some(2));
        assert_eq!(labels(&outcome.table), vec![Some("NO"), Some("YES"), Some("YES")]);

        let text = report.to_string();
        assert!(text.contains("Duplicates before cleaning: 1"));
        assert!(text.contains("Cleaned dataset shape: (3, 7)"));
    }
}
