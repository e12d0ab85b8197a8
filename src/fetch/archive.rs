use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{DatasetError, Result};

/// A located archive that can be streamed from the start any number of times
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHandle {
    path: PathBuf,
}

impl ArchiveHandle {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = fs::metadata(&path)
            .map_err(|e| DatasetError::unavailable(path.display().to_string(), e))?;
        if !metadata.is_file() {
            return Err(DatasetError::unavailable(
                path.display().to_string(),
                "archive path is not a file",
            ));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a new sequential pass over the archive
    pub fn entries(&self) -> Result<ArchiveEntries> {
        let file = File::open(&self.path)
            .map_err(|e| DatasetError::unavailable(self.path.display().to_string(), e))?;
        debug!("Opened archive stream: {:?}", self.path);
        Ok(ArchiveEntries {
            path: self.path.clone(),
            reader: BufReader::new(file),
            done: false,
        })
    }
}

/// One file read out of an archive stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry path inside the archive, `/`-separated
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Forward-only iterator over the files of a zip archive.
///
/// Entries are read from local headers in stored order, once each, without seeking;
/// the file handle is closed when the iterator is dropped.
pub struct ArchiveEntries {
    path: PathBuf,
    reader: BufReader<File>,
    done: bool,
}

impl ArchiveEntries {
    fn fail(&mut self, reason: impl ToString) -> Option<Result<ArchiveEntry>> {
        self.done = true;
        Some(Err(DatasetError::Archive {
            path: self.path.clone(),
            reason: reason.to_string(),
        }))
    }
}

impl Iterator for ArchiveEntries {
    type Item = Result<ArchiveEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let outcome = match zip::read::read_zipfile_from_stream(&mut self.reader) {
                Ok(Some(mut file)) => {
                    if file.is_dir() {
                        continue;
                    }
                    let path = file.name().to_string();
                    let mut bytes = Vec::with_capacity(file.size() as usize);
                    match file.read_to_end(&mut bytes) {
                        Ok(_) => Ok(Some(ArchiveEntry { path, bytes })),
                        Err(e) => Err(format!("failed to read entry {}: {}", path, e)),
                    }
                }
                Ok(None) => Ok(None),
                Err(e) => Err(e.to_string()),
            };
            return match outcome {
                Ok(Some(entry)) => Some(Ok(entry)),
                Ok(None) => {
                    self.done = true;
                    info!("Reached end of archive: {:?}", self.path);
                    None
                }
                Err(reason) => self.fail(reason),
            };
        }
    }
}

impl std::iter::FusedIterator for ArchiveEntries {}

/// Extract a whole zip archive into `dest`
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)
        .map_err(|e| DatasetError::unavailable(archive.display().to_string(), e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| DatasetError::Archive {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::create_dir_all(dest)?;
    zip.extract(dest).map_err(|e| DatasetError::Archive {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })?;
    info!("Extracted {:?} into {:?}", archive, dest);
    Ok(())
}

pub fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("zip"))
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;

    /// Write a zip archive whose entries appear in the given order
    pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }
}
