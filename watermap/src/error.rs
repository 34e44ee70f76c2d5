//! Error types for the watermap library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for watermap operations
pub type WatermapResult<T> = Result<T, WatermapError>;

/// Errors that can occur while loading resources or running an aggregation.
#[derive(Error, Debug)]
pub enum WatermapError {
    #[error("failed to load water mask from {}: {source}", path.display())]
    MaskLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("water mask has zero width or height")]
    EmptyMask,

    #[error("malformed sample document: {0}")]
    Input(#[source] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize export: {0}")]
    Export(#[source] serde_json::Error),

    #[error("worker pool error: {0}")]
    Worker(String),
}
