//! Stage runners
//!
//! Each stage reads its input from disk and, where it produces a table,
//! writes it back to disk. Stages share nothing in memory, so any of them
//! can be re-run on its own against the files of a previous run.

use std::path::Path;

use tracing::info;

use crate::cleaner::{self, CleaningReport};
use crate::config::PipelineConfig;
use crate::csv_reader::{load_table, write_json, write_table};
use crate::error::Result;
use crate::features::{derive_features, stratified_split, LabelEncoding};
use crate::model::{train_and_evaluate, TrainingSummary};
use crate::report::{analyze, ExploratoryReport};
use crate::table::Table;

#[derive(Debug)]
pub struct CleanStage {
    pub report: CleaningReport,
    pub table: Table,
}

/// Load, clean and persist. A fatal error leaves no output file.
pub fn run_clean(input: &Path, output: &Path, config: &PipelineConfig) -> Result<CleanStage> {
    let raw = load_table(input, &config.loader)?;
    let outcome = cleaner::clean(raw, &config.cleaner)?;
    write_table(&outcome.table, output)?;

    info!(
        output = %output.display(),
        rows = outcome.report.rows_retained,
        "Cleaned data saved"
    );
    Ok(CleanStage {
        report: outcome.report,
        table: outcome.table,
    })
}

pub fn run_report(input: &Path, config: &PipelineConfig) -> Result<ExploratoryReport> {
    let table = load_table(input, &config.loader)?;
    analyze(&table, &config.report)
}

#[derive(Debug)]
pub struct TrainStage {
    pub encodings: Vec<LabelEncoding>,
    pub rows_skipped: usize,
    pub summary: TrainingSummary,
}

pub fn run_train(input: &Path, encodings_out: Option<&Path>, config: &PipelineConfig) -> Result<TrainStage> {
    let table = load_table(input, &config.loader)?;
    let features = derive_features(&table)?;
    let split = stratified_split(&features, config.split.test_fraction, config.split.seed)?;
    let summary = train_and_evaluate(&split, &config.model)?;

    if let Some(path) = encodings_out {
        write_json(&features.encodings, path)?;
        info!(path = %path.display(), "Saved label encodings");
    }

    Ok(TrainStage {
        encodings: features.encodings,
        rows_skipped: features.rows_skipped,
        summary,
    })
}
