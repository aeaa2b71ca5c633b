//! Error types for the sweeprun-core crate.

use thiserror::Error;

/// Top-level error type for harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unrecognized experiment type: {0}")]
    UnknownExperimentType(String),

    #[error("Unknown hyperparameter: {0}")]
    UnknownParameter(String),

    #[error("exp_index {index} out of range (total jobs: {njobs})")]
    IndexOutOfRange { index: usize, njobs: usize },

    #[error("Trainer error: {0}")]
    Trainer(String),

    #[error("Tracker error: {0}")]
    Tracker(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl HarnessError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn trainer(msg: impl Into<String>) -> Self {
        Self::Trainer(msg.into())
    }

    pub fn tracker(msg: impl Into<String>) -> Self {
        Self::Tracker(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<Box<figment::Error>> for HarnessError {
    fn from(err: Box<figment::Error>) -> Self {
        Self::Config(err.to_string())
    }
}
