use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unsupported metric '{0}' (expected 'l2' or 'cosine')")]
    UnsupportedMetric(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Missing index artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt index artifact: {0}")]
    Corrupt(String),

    #[error("Metadata error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration source error: {0}")]
    Figment(#[from] figment::Error),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Sentence segmentation failed: {0}")]
    Segmentation(String),

    #[error("Accelerator unavailable: {0}")]
    Accelerator(String),
}

/// Coarse failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Precondition,
    Io,
    ExternalCapability,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::UnsupportedMetric(_) | Error::Figment(_) => ErrorKind::Configuration,
            Error::Precondition(_) | Error::DimensionMismatch { .. } => ErrorKind::Precondition,
            Error::MissingArtifact(_) | Error::Io(_) | Error::Corrupt(_) | Error::Json(_) => ErrorKind::Io,
            Error::Embedding(_) | Error::Segmentation(_) | Error::Accelerator(_) => ErrorKind::ExternalCapability,
        }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
