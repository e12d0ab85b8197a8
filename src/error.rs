//! Error types for dataset definition, resource fetching and generation

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for dataset operations
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Errors raised while describing, planning or generating a dataset
#[derive(Error, Debug)]
pub enum DatasetError {
    /// A yielded record disagrees with the declared features. Aborts the split.
    #[error("Schema mismatch in split '{split}' for record '{key}': {reason}")]
    SchemaMismatch {
        split: String,
        key: String,
        reason: String,
    },

    /// A declared URL or path could not be resolved or fetched
    #[error("Resource unavailable: {locator}: {reason}")]
    ResourceUnavailable { locator: String, reason: String },

    /// A metadata row points at a file that does not exist next to it
    #[error("Metadata row in {metadata} references missing file '{file_name}'")]
    DanglingReference {
        metadata: PathBuf,
        file_name: String,
    },

    /// An image has no matching metadata row
    #[error("No metadata row for {path}")]
    MissingMetadata { path: PathBuf },

    /// The declared schema is inconsistent with itself
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A metadata file is malformed (missing key, bad JSON, conflicting types)
    #[error("Invalid metadata in {path}: {reason}")]
    InvalidMetadata { path: PathBuf, reason: String },

    #[error("Configuration '{0}' is registered twice")]
    DuplicateConfig(String),

    #[error("Unknown configuration '{name}' (available: {available:?})")]
    UnknownConfig {
        name: String,
        available: Vec<String>,
    },

    #[error("Split '{0}' is planned twice")]
    DuplicateSplit(String),

    #[error("Archive error in {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl DatasetError {
    pub(crate) fn unavailable(locator: impl Into<String>, reason: impl ToString) -> Self {
        DatasetError::ResourceUnavailable {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DatasetError::InvalidMetadata {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
