use crate::cleaner::{clean, normalize_labels, remove_duplicates, LABEL_NO, LABEL_YES};
use crate::config::{CleanerConfig, PipelineConfig, EXPECTED_COLUMNS};
use crate::csv_reader::load_table;
use crate::error::PipelineError;
use crate::features::hour_of_day;
use crate::pipeline::{run_clean, run_report, run_train};
use crate::table::{Row, Table};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HEADER: &str = "user_id,device_id,amount,time,payment_method,category,fraud";

    fn write_input(dir: &TempDir, name: &str, header: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut body = String::from(header);
        for line in lines {
            body.push('\n');
            body.push_str(line);
        }
        body.push('\n');
        fs::write(&path, body).unwrap();
        path
    }

    fn columns() -> Vec<String> {
        EXPECTED_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn row(cells: [Option<&str>; 7]) -> Row {
        cells.iter().map(|c| c.map(str::to_string)).collect()
    }

    fn fraud_column(table: &Table) -> Vec<Option<String>> {
        table
            .text_column("fraud")
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    #[test]
    fn test_clean_end_to_end() {
        let dir = TempDir::new().unwrap();
        let input = write_input(
            &dir,
            "basic_in.csv",
            HEADER,
            &[
                "1,1,10,100,card,food,0",
                "1,1,10,100,card,food,0",
                "2,2,-3,200,cash,travel,1",
            ],
        );
        let output = dir.path().join("basic_out.csv");
        let config = PipelineConfig::default();

        let stage = run_clean(&input, &output, &config).unwrap();
        assert_eq!(stage.report.rows_loaded, 3);
        assert_eq!(stage.report.duplicates_removed, 1);
        assert_eq!(stage.report.duplicates_after, 0);
        assert_eq!(stage.report.rows_retained, 2);
        assert_eq!(stage.report.negative_amount_rows, 1);
        assert_eq!(
            fraud_column(&stage.table),
            vec![Some(LABEL_NO.to_string()), Some(LABEL_YES.to_string())]
        );

        // the written file is the input of the next stage
        let reloaded = load_table(&output, &config.loader).unwrap();
        assert_eq!(reloaded.shape(), (2, 7));
        assert_eq!(fraud_column(&reloaded), fraud_column(&stage.table));
        assert_eq!(reloaded.cell(1, 2), Some("-3"));
    }

    #[test]
    fn test_unrecognized_label_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let input = write_input(
            &dir,
            "badlabel_in.csv",
            HEADER,
            &["1,1,10,100,card,food,0", "2,2,5,200,cash,travel,2"],
        );
        let output = dir.path().join("badlabel_out.csv");

        let err = run_clean(&input, &output, &PipelineConfig::default()).unwrap_err();
        match err {
            PipelineError::UnrecognizedLabel { row, value } => {
                assert_eq!(row, 2);
                assert_eq!(value, "2");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_fraud_column_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let input = write_input(
            &dir,
            "nofraud_in.csv",
            "user_id,device_id,amount,time,payment_method,category",
            &["1,1,10,100,card,food"],
        );
        let output = dir.path().join("nofraud_out.csv");

        let err = run_clean(&input, &output, &PipelineConfig::default()).unwrap_err();
        match err {
            PipelineError::Schema(message) => assert!(message.contains("fraud")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.exists());
    }

    #[test]
    fn test_non_numeric_amount_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let input = write_input(&dir, "text_amount_in.csv", HEADER, &["1,1,ten,100,card,food,0"]);
        let output = dir.path().join("text_amount_out.csv");

        let err = run_clean(&input, &output, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("missing_out.csv");
        let err = run_clean(&dir.path().join("no_such_file.csv"), &output, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_whitespace_variants_are_not_duplicates() {
        let dir = TempDir::new().unwrap();
        let input = write_input(
            &dir,
            "spaces_in.csv",
            HEADER,
            &["1,1,10,0,card,food,0", "1,1,10,0, card,food,0"],
        );
        let output = dir.path().join("spaces_out.csv");

        let stage = run_clean(&input, &output, &PipelineConfig::default()).unwrap();
        assert_eq!(stage.report.duplicates_removed, 0);
        assert_eq!(stage.report.rows_retained, 2);
        assert!(fs::read_to_string(&output).unwrap().contains(" card"));
    }

    #[test]
    fn test_negative_amount_is_kept_verbatim() {
        let dir = TempDir::new().unwrap();
        let input = write_input(&dir, "negative_in.csv", HEADER, &["7,3,-5.00,50,card,food,1"]);
        let output = dir.path().join("negative_out.csv");

        let stage = run_clean(&input, &output, &PipelineConfig::default()).unwrap();
        assert_eq!(stage.report.negative_amount_rows, 1);
        assert_eq!(stage.report.negative_amount_examples.len(), 1);

        let written = fs::read_to_string(&output).unwrap();
        assert!(written.contains("-5.00"));
    }

    #[test]
    fn test_missing_threshold_boundary() {
        // 7 columns, tolerance 3: three gaps survive, four do not
        let table = Table::new(
            columns(),
            vec![
                row([None, Some("1"), Some("10"), Some("5"), None, None, Some("0")]),
                row([None, Some("2"), Some("20"), None, None, None, Some("1")]),
                row([Some("3"), Some("3"), Some("30"), Some("7"), Some("card"), Some("food"), Some("1")]),
            ],
        );
        let outcome = clean(table, &CleanerConfig::default()).unwrap();
        assert_eq!(outcome.report.rows_dropped_for_missing, 1);
        assert_eq!(outcome.report.rows_retained, 2);
        assert_eq!(outcome.table.cell(0, 1), Some("1"));
        assert_eq!(outcome.table.cell(1, 1), Some("3"));
    }

    #[test]
    fn test_report_and_train_from_cleaned_file() {
        let mut lines = Vec::new();
        for i in 0..20 {
            let fraud = i % 2;
            let amount = if fraud == 1 { 500 + i * 10 } else { 20 + i };
            let payment = if i % 3 == 0 { "card" } else { "cash" };
            lines.push(format!("{},{},{},{},{},shop,{}", i % 4, i, amount, i * 3700, payment, fraud));
        }
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let dir = TempDir::new().unwrap();
        let input = write_input(&dir, "train_in.csv", HEADER, &refs);
        let cleaned = dir.path().join("train_clean.csv");
        let encodings = dir.path().join("train_encodings.json");
        let config = PipelineConfig::default();

        run_clean(&input, &cleaned, &config).unwrap();

        let report = run_report(&cleaned, &config).unwrap();
        assert_eq!(report.class_balance.fraudulent, 10);
        assert_eq!(report.class_balance.legitimate, 10);

        let stage = run_train(&cleaned, Some(encodings.as_path()), &config).unwrap();
        assert_eq!(stage.rows_skipped, 0);
        assert_eq!(stage.summary.train_samples + stage.summary.test_samples, 20);
        assert_eq!(stage.summary.test_fraud, 2);
        assert_eq!(stage.summary.models.len(), 2);
        assert!(stage.summary.best_model.is_some());
        assert!(encodings.exists());
    }

    #[test]
    fn test_hour_bucket() {
        assert_eq!(hour_of_day(3661.0), 1);
        assert_eq!(hour_of_day(0.0), 0);
        assert_eq!(hour_of_day(86399.0), 23);
    }

    fn arb_label() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some("0".to_string())),
            Just(Some("1".to_string())),
            Just(Some("0.0".to_string())),
            Just(Some("NO".to_string())),
            Just(Some("YES".to_string())),
        ]
    }

    fn arb_numeric() -> impl Strategy<Value = Option<String>> {
        prop_oneof![Just(None), (-3i32..4).prop_map(|v| Some(v.to_string()))]
    }

    fn arb_text() -> impl Strategy<Value = Option<String>> {
        prop_oneof![Just(None), Just(Some("card".to_string())), Just(Some("cash".to_string()))]
    }

    fn arb_table() -> impl Strategy<Value = Table> {
        let arb_row = (
            arb_numeric(),
            arb_numeric(),
            arb_numeric(),
            arb_numeric(),
            arb_text(),
            arb_text(),
            arb_label(),
        )
            .prop_map(|(u, d, a, t, p, c, f)| vec![u, d, a, t, p, c, f]);
        prop::collection::vec(arb_row, 0..24).prop_map(|rows| Table::new(columns(), rows))
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(table in arb_table()) {
            let once = normalize_labels(table).unwrap();
            let twice = normalize_labels(once.clone()).unwrap();
            prop_assert_eq!(once.rows(), twice.rows());
        }

        #[test]
        fn prop_dedupe_reaches_fixed_point(table in arb_table()) {
            let (once, _) = remove_duplicates(table);
            let (twice, removed) = remove_duplicates(once.clone());
            prop_assert_eq!(removed, 0);
            prop_assert_eq!(once.rows(), twice.rows());
        }

        #[test]
        fn prop_row_count_law(table in arb_table(), tolerance in 0usize..8) {
            let config = CleanerConfig { missing_tolerance: tolerance, ..CleanerConfig::default() };
            let report = clean(table, &config).unwrap().report;
            prop_assert_eq!(
                report.rows_retained,
                report.rows_loaded - report.duplicates_removed - report.rows_dropped_for_missing
            );
            prop_assert_eq!(report.duplicates_after, 0);
        }

        #[test]
        fn prop_cleaned_labels_are_canonical(table in arb_table()) {
            let outcome = clean(table, &CleanerConfig::default()).unwrap();
            for label in outcome.table.text_column("fraud").unwrap() {
                prop_assert!(label == Some(LABEL_NO) || label == Some(LABEL_YES));
            }
        }
    }
}
