//! Error taxonomy for the analysis engine
//!
//! Classification and attribution never fail for data-shape reasons; only
//! I/O, database and subprocess paths produce these errors.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading captures or running the pipeline
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Missing artifact: {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("Converter {program} failed: {reason}")]
    ConverterFailure { program: String, reason: String },

    #[error("Converter {program} timed out after {timeout:?}")]
    ConverterTimeout { program: String, timeout: Duration },

    #[error("No usable round for step {step}")]
    InsufficientRoundData { step: u32 },

    #[error("All {0} steps failed")]
    AllStepsFailed(usize),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl AnalysisError {
    /// Whether this error only invalidates a single round (it is excluded from selection)
    pub fn is_round_local(&self) -> bool {
        matches!(
            self,
            AnalysisError::MissingArtifact { .. }
                | AnalysisError::ConverterFailure { .. }
                | AnalysisError::ConverterTimeout { .. }
                | AnalysisError::Database(_)
        )
    }
}

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;
