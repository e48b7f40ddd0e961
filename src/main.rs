// Entry point for the fraud analytics pipeline. Parses the command line, sets up logging, and runs the requested stages.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::PipelineConfig;
use crate::csv_reader::write_json;
use crate::pipeline::{run_clean, run_report, run_train, CleanStage};

//imports other modules in the pipeline
mod cleaner;
mod config;
mod csv_reader;
mod error;
mod features;
mod model;
mod pipeline;
mod report;
mod stats;
mod table;
//end-to-end scenarios
#[cfg(test)]
mod tests;

const DEFAULT_CLEANED_PATH: &str = "cleaned_fraud_data.csv";
const PREVIEW_ROWS: usize = 5;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Clean, explore and model a fraud transaction dataset",
    long_about = "Runs the fraud analytics stages over flat files.\n\n\
                  clean   raw CSV -> cleaned CSV plus a diagnostic report\n\
                  report  cleaned CSV -> grouped fraud statistics and correlations\n\
                  train   cleaned CSV -> class-weighted baseline models and metrics\n\
                  run     all of the above, handing off through the cleaned CSV"
)]
struct Args {
    /// TOML/JSON configuration file; unspecified values keep their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Override the per-row missing-value tolerance
    #[arg(long, global = true)]
    missing_tolerance: Option<usize>,

    /// Override the train/test split seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clean a raw transaction file
    Clean {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long, default_value = DEFAULT_CLEANED_PATH)]
        output: PathBuf,
        /// Also write the diagnostic report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,
    },
    /// Exploratory statistics over a cleaned file
    Report {
        #[arg(short, long, default_value = DEFAULT_CLEANED_PATH)]
        input: PathBuf,
        /// Also write the report as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Train and evaluate baseline models on a cleaned file
    Train {
        #[arg(short, long, default_value = DEFAULT_CLEANED_PATH)]
        input: PathBuf,
        /// Where to store the categorical encodings
        #[arg(long)]
        encodings: Option<PathBuf>,
    },
    /// Clean, then report and train from the cleaned file
    Run {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long, default_value = DEFAULT_CLEANED_PATH)]
        output: PathBuf,
    },
}

// Sets up the tracing subscriber
// RUST_LOG takes precedence; otherwise -v raises the crate's level
fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("fraud_pipeline={level}")))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

// Builds the effective configuration
// Inputs: parsed arguments
// Outputs: file configuration (or defaults) with command-line overrides applied
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from_path(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(tolerance) = args.missing_tolerance {
        config.cleaner.missing_tolerance = tolerance;
    }
    if let Some(seed) = args.seed {
        config.split.seed = seed;
    }
    Ok(config)
}

fn clean(input: &Path, output: &Path, report_json: Option<&Path>, config: &PipelineConfig) -> Result<()> {
    let CleanStage { report, table } = run_clean(input, output, config)
        .with_context(|| format!("cleaning {} failed", input.display()))?;

    println!("{report}");
    println!("\nCleaned dataset shape: {:?}", table.shape());
    println!("\nFirst few rows:");
    print!("{}", table.preview(PREVIEW_ROWS));
    println!("\nTime column statistics:");
    match &report.time_summary {
        Some(summary) => println!("{summary}"),
        None => println!("no time values"),
    }
    println!("\nCleaned data saved as '{}'", output.display());

    if let Some(path) = report_json {
        write_json(&report, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn report(input: &Path, json: Option<&Path>, config: &PipelineConfig) -> Result<()> {
    let report = run_report(input, config)
        .with_context(|| format!("analysis of {} failed", input.display()))?;

    println!("{}", "=".repeat(70));
    println!("FRAUD DETECTION EDA - STATISTICAL ANALYSIS");
    println!("{}", "=".repeat(70));
    println!("{report}");

    if let Some(path) = json {
        write_json(&report, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn train(input: &Path, encodings: Option<&Path>, config: &PipelineConfig) -> Result<()> {
    let stage = run_train(input, encodings, config)
        .with_context(|| format!("training on {} failed", input.display()))?;

    println!("{}", "=".repeat(70));
    println!("FRAUD DETECTION - BASELINE MODEL TRAINING");
    println!("{}", "=".repeat(70));
    for encoding in &stage.encodings {
        let pairs: Vec<String> = encoding
            .classes
            .iter()
            .enumerate()
            .map(|(code, class)| format!("{class}={code}"))
            .collect();
        println!("Encoded {}: {}", encoding.column, pairs.join(", "));
    }
    if stage.rows_skipped > 0 {
        println!("Rows without a complete feature set: {}", stage.rows_skipped);
    }
    println!("\n{}", stage.summary);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;
    let config = load_config(&args)?;

    info!(command = ?args.command, "Starting fraud pipeline");
    match &args.command {
        Command::Clean {
            input,
            output,
            report_json,
        } => clean(input, output, report_json.as_deref(), &config),
        Command::Report { input, json } => report(input, json.as_deref(), &config),
        Command::Train { input, encodings } => train(input, encodings.as_deref(), &config),
        Command::Run { input, output } => {
            clean(input, output, None, &config)?;
            report(output, None, &config)?;
            train(output, None, &config)
        }
    }
}
