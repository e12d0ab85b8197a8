use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::{error, info};

use crate::error::Result;

/// Move a file into place, falling back to copy + remove when a rename crosses devices.
///
/// Used to publish a finished download into the cache so a partially written file is
/// never visible under its final name.
pub fn move_file(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(src, dest).is_ok() {
        info!("Moved {:?} to {:?}", src, dest);
        return Ok(());
    }

    if let Err(e) = fs::copy(src, dest) {
        error!("Failed to copy file from {:?} to {:?}: {}", src, dest, e);
        return Err(e.into());
    }
    if let Err(e) = fs::remove_file(src) {
        error!("Failed to remove original file {:?} after copy: {}", src, e);
        let _ = fs::remove_file(dest);
        return Err(e.into());
    }

    info!("Copied {:?} to {:?}", src, dest);
    Ok(())
}

/// First 32 hex digits of the SHA-256 of `parts`
fn short_digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
        hasher.update([0u8]);
    }
    let hex = format!("{:x}", hasher.finalize());
    hex[..32].to_string()
}

/// Anything outside `[A-Za-z0-9._-]` becomes `_`
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Cache file name for a URL: a digest of the full URL followed by its last path segment
pub fn cache_file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let last = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("download");

    format!("{}-{}", short_digest(&[url.as_bytes()]), sanitize(last))
}

/// Directory name for the extracted contents of an archive, keyed on its absolute
/// path, size and modification time
pub fn extraction_dir_name(archive: &Path) -> Result<String> {
    let metadata = fs::metadata(archive)?;
    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos());
    let absolute = fs::canonicalize(archive)?;
    let stem = archive
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("archive");

    let digest = short_digest(&[
        absolute.to_string_lossy().as_bytes(),
        &metadata.len().to_le_bytes(),
        &modified.to_le_bytes(),
    ]);
    Ok(format!("{}-{}", digest, sanitize(stem)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_move_file_creates_parent() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("part");
        fs::write(&src, b"data")?;
        let dest = dir.path().join("cache/downloads/final.zip");

        move_file(&src, &dest)?;
        assert!(!src.exists());
        assert_eq!(fs::read(&dest)?, b"data");
        Ok(())
    }

    #[test]
    fn test_cache_file_name_keeps_extension_and_differs_per_url() {
        let a = cache_file_name("https://example.org/data/images.zip?download=true");
        let b = cache_file_name("https://mirror.example.org/data/images.zip");
        assert!(a.ends_with("-images.zip"));
        assert!(b.ends_with("-images.zip"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_cache_file_name_is_a_stable_digest() {
        let name = cache_file_name("https://example.org/data/images.zip");
        let (digest, rest) = name.split_once('-').unwrap();
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(rest, "images.zip");
        assert_eq!(name, cache_file_name("https://example.org/data/images.zip"));
    }

    #[test]
    fn test_extraction_dir_name_tracks_path_and_contents() -> Result<()> {
        let dir = tempdir()?;
        let a = dir.path().join("a/data.zip");
        let b = dir.path().join("b/data.zip");
        fs::create_dir_all(a.parent().unwrap())?;
        fs::create_dir_all(b.parent().unwrap())?;
        fs::write(&a, b"one")?;
        fs::write(&b, b"one")?;

        let name_a = extraction_dir_name(&a)?;
        assert!(name_a.ends_with("-data"));
        assert_ne!(name_a, extraction_dir_name(&b)?);
        assert_eq!(name_a, extraction_dir_name(&a)?);

        fs::write(&a, b"changed")?;
        assert_ne!(name_a, extraction_dir_name(&a)?);
        Ok(())
    }
}
