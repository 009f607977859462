//! Error Handling Module
//!
//! Defines the error type shared by the dataset, model and training modules.
//! Uses thiserror for ergonomic error definitions.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main error type for ResNet-101 training operations
#[derive(Error, Debug)]
pub enum ResNetError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model construction, saving or loading
    #[error("Model error: {0}")]
    Model(String),

    /// Residual addition between tensors with different channel counts
    #[error("Channel mismatch: block expects {expected} input channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for ResNetError {
    fn from(err: serde_json::Error) -> Self {
        ResNetError::Serialization(err.to_string())
    }
}

/// Convenience Result type
pub type Result<T> = std::result::Result<T, ResNetError>;

/// Conversions from foreign errors into [`ResNetError`] variants
pub trait ResultExt<T> {
    /// Report the failure as an unreadable image at `path`
    fn for_image(self, path: &Path) -> Result<T>;

    /// Report the failure as a configuration problem
    fn in_config(self, what: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn for_image(self, path: &Path) -> Result<T> {
        self.map_err(|e| ResNetError::ImageLoad(path.to_path_buf(), e.to_string()))
    }

    fn in_config(self, what: &str) -> Result<T> {
        self.map_err(|e| ResNetError::Config(format!("{what}: {e}")))
    }
}
