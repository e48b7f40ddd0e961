//! Pipeline configuration
//!
//! Every section has a `Default` matching the behaviour of a plain run, so a
//! configuration file only needs to name the values it changes.

use crate::error::Result;
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Columns every input file is expected to carry, in canonical order
pub const EXPECTED_COLUMNS: [&str; 7] = [
    "user_id",
    "device_id",
    "amount",
    "time",
    "payment_method",
    "category",
    "fraud",
];

/// Columns the cleaner cannot run without
pub const REQUIRED_COLUMNS: [&str; 4] = ["fraud", "amount", "device_id", "time"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub loader: LoaderConfig,
    pub cleaner: CleanerConfig,
    pub report: ReportConfig,
    pub split: SplitConfig,
    pub model: ModelConfig,
}

/// How raw files are read
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Columns whose absence is a schema error
    pub expected_columns: Vec<String>,
    /// Cell values (after trimming) treated as missing, besides the empty string
    pub null_markers: Vec<String>,
    pub delimiter: char,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            expected_columns: EXPECTED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            null_markers: [
                "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "<NA>",
                "#N/A",
            ]
            .iter()
            .map(|m| m.to_string())
            .collect(),
            delimiter: ',',
        }
    }
}

/// Cleaning policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    pub required_columns: Vec<String>,
    /// A row is kept while it has at least `column_count - missing_tolerance`
    /// non-missing cells
    pub missing_tolerance: usize,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            required_columns: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            missing_tolerance: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Length of the "top users" and "top devices" rankings
    pub top_n: usize,
    /// Length of the high-risk hours ranking
    pub top_hours: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            top_hours: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub max_iterations: usize,
    pub learning_rate: f64,
    /// Inverse regularization strength, as in `C` of a logistic regression
    pub inverse_regularization: f64,
    pub tree_max_depth: usize,
    /// Probability at or above which a transaction is flagged
    pub decision_threshold: f64,
    pub false_positive_cost: f64,
    pub false_negative_cost: f64,
    /// Number of ranked features printed per model
    pub top_features: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            learning_rate: 0.1,
            inverse_regularization: 1.0,
            tree_max_depth: 15,
            decision_threshold: 0.5,
            false_positive_cost: 10.0,
            false_negative_cost: 100.0,
            top_features: 5,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML/JSON/YAML file, falling back to defaults
    /// for anything the file leaves out
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.loader.expected_columns.len(), 7);
        assert_eq!(config.loader.delimiter, ',');
        assert_eq!(config.cleaner.missing_tolerance, 3);
        assert_eq!(config.cleaner.required_columns, vec!["fraud", "amount", "device_id", "time"]);
        assert_eq!(config.split.seed, 42);
        assert_eq!(config.split.test_fraction, 0.2);
    }

    #[test]
    fn test_partial_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[cleaner]\nmissing_tolerance = 1\n\n[split]\nseed = 7\n").unwrap();

        let config = PipelineConfig::load_from_path(&path).unwrap();

        assert_eq!(config.cleaner.missing_tolerance, 1);
        assert_eq!(config.cleaner.required_columns.len(), 4);
        assert_eq!(config.split.seed, 7);
        assert_eq!(config.split.test_fraction, 0.2);
        assert_eq!(config.report.top_n, 10);
    }
}
