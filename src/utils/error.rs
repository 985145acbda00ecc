//! Error Handling Module
//!
//! Defines the error type shared by the data pipeline, the trainer and the
//! evaluation stage. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the image classifier
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// A configured directory or file does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// A split directory has no class folders or no images
    #[error("Dataset at '{0}' is empty: {1}")]
    EmptyDataset(PathBuf, String),

    /// The class folders of a split do not match the training split
    #[error(
        "Class mismatch in {split} split: missing {missing:?}, unexpected {unexpected:?}"
    )]
    ClassMismatch {
        split: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model could not be saved or restored
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Training driver misuse or numeric failure
    #[error("Training error: {0}")]
    Training(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience Result type for classifier operations
pub type Result<T> = std::result::Result<T, ClassifierError>;
