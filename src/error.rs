//! Error types shared by every pipeline stage.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a pipeline stage
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source missing or unreadable, or destination not writable
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed delimited input or a failed CSV write
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Expected columns absent, or a numeric column holding text
    #[error("schema error: {0}")]
    Schema(String),

    /// Fraud label outside the two-valued domain
    #[error("unrecognized fraud label {value:?} in data row {row}")]
    UnrecognizedLabel { row: usize, value: String },

    /// Training could not proceed
    #[error("model error: {0}")]
    Model(String),

    /// Configuration file could not be read or deserialized
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn missing_columns(columns: &[String]) -> Self {
        PipelineError::Schema(format!("missing required column(s): {}", columns.join(", ")))
    }
}
