//! Resource fetching: resolving locators to local files and streaming archives
//!
//! Builders only see the `ResourceFetcher` capability; `DownloadManager` is the
//! implementation used by the command line tool.

mod archive;
mod download;
mod file_ops;

use std::path::{Path, PathBuf};

use crate::error::Result;

pub use archive::{extract_zip, is_zip, ArchiveEntries, ArchiveEntry, ArchiveHandle};
pub use download::DownloadManager;

#[cfg(test)]
pub(crate) use archive::test_utils;

/// Capability to resolve, download and unpack named or URL-addressed resources
pub trait ResourceFetcher {
    /// Make the resource available locally and return its path
    fn download(&mut self, locator: &str) -> Result<PathBuf>;

    /// Like `download`, then unpack archives into a directory. Non-archives are
    /// returned as they are.
    fn download_and_extract(&mut self, locator: &str) -> Result<PathBuf>;

    /// Handle for streaming an archive sequentially, entry by entry
    fn iter_archive(&self, path: &Path) -> Result<ArchiveHandle> {
        ArchiveHandle::open(path)
    }
}
