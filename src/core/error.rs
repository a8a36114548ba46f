//! Error types for surrogate model fitting and explanation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernexError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Consistency check failed ({context}) at row {index}: expected {expected}, got {actual}")]
    Consistency {
        context: String,
        index: usize,
        expected: f64,
        actual: f64,
    },

    #[error("External solver failure: {0}")]
    ExternalProcess(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Invalid label: expected {expected}, got {actual}")]
    InvalidLabel {
        expected: &'static str,
        actual: f64,
    },

    #[error("Estimator has not been fitted")]
    NotFitted,

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, KernexError>;
