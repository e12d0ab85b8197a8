//! Exporting a materialized dataset to a named destination

mod folder;

use std::fmt;

use crate::core::{DatasetDict, SplitInfo};
use crate::error::{DatasetError, Result};

pub use folder::FolderPublisher;

/// Outcome of a successful publish
#[derive(Debug, Clone, PartialEq)]
pub struct PublishReceipt {
    /// `namespace/name`
    pub destination: String,
    /// Where the dataset landed (a directory or URL)
    pub location: String,
    pub files_written: usize,
    pub splits: Vec<SplitInfo>,
}

impl fmt::Display for PublishReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: usize = self.splits.iter().map(|s| s.num_examples).sum();
        write!(
            f,
            "Published {} to {} ({} files, {} splits, {} rows)",
            self.destination,
            self.location,
            self.files_written,
            self.splits.len(),
            rows
        )
    }
}

/// A place datasets can be published to
pub trait Publisher {
    fn publish(&self, dataset: &DatasetDict, destination: &str) -> Result<PublishReceipt>;
}

/// Split `namespace/name`, rejecting anything that is not two plain path segments
pub fn parse_destination(destination: &str) -> Result<(&str, &str)> {
    let valid = |part: &str| {
        !part.is_empty()
            && part != "."
            && part != ".."
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    match destination.split_once('/') {
        Some((namespace, name)) if valid(namespace) && valid(name) => Ok((namespace, name)),
        _ => Err(DatasetError::Publish(format!(
            "invalid destination '{}': must be 'namespace/name'",
            destination
        ))),
    }
}
