use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::archive::{extract_zip, is_zip};
use super::file_ops::{cache_file_name, extraction_dir_name, move_file};
use super::ResourceFetcher;
use crate::config::LoaderConfig;
use crate::error::{DatasetError, Result};

/// Resolves resource locators to local files.
///
/// - `http://` / `https://` URLs are downloaded once into `<cache>/downloads`
/// - `file://` URLs and plain paths resolve in place; relative paths are taken
///   from `base_dir` (the directory of the descriptor or data folder)
/// - zip archives are extracted into `<cache>/extracted` on request
pub struct DownloadManager {
    base_dir: PathBuf,
    cache_dir: PathBuf,
    client: Option<reqwest::blocking::Client>,
    resolved: BTreeMap<String, PathBuf>,
}

impl DownloadManager {
    pub fn new(base_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache_dir: cache_dir.into(),
            client: None,
            resolved: BTreeMap::new(),
        }
    }

    pub fn from_config(base_dir: impl Into<PathBuf>, config: &LoaderConfig) -> Self {
        Self::new(base_dir, config.cache_dir.clone())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Every locator resolved so far and where it landed
    pub fn resolved(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.resolved.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }

    fn is_remote(locator: &str) -> bool {
        locator.starts_with("http://") || locator.starts_with("https://")
    }

    fn resolve_local(&self, locator: &str) -> Result<PathBuf> {
        let raw = locator.strip_prefix("file://").unwrap_or(locator);
        if raw.contains("://") {
            return Err(DatasetError::unavailable(locator, "unsupported URL scheme"));
        }
        let path = Path::new(raw);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        if !path.exists() {
            return Err(DatasetError::unavailable(locator, "no such file or directory"));
        }
        Ok(path)
    }

    fn fetch_remote(&mut self, url: &str) -> Result<PathBuf> {
        let dest = self.cache_dir.join("downloads").join(cache_file_name(url));
        if dest.is_file() {
            info!("Using cached download for {}: {:?}", url, dest);
            return Ok(dest);
        }

        if self.client.is_none() {
            let client = reqwest::blocking::Client::builder()
                .user_agent(concat!("image-dataset-builder/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| DatasetError::unavailable(url, e))?;
            self.client = Some(client);
        }
        let client = self.client.as_ref().ok_or_else(|| {
            DatasetError::unavailable(url, "HTTP client could not be created")
        })?;

        info!("Downloading {}", url);
        let mut response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| DatasetError::unavailable(url, e))?;

        let partial = self.cache_dir.join("tmp").join(cache_file_name(url));
        if let Some(parent) = partial.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&partial)?;
        let written = io::copy(&mut response, &mut out)
            .map_err(|e| DatasetError::unavailable(url, e))?;
        drop(out);
        move_file(&partial, &dest)?;

        info!("Downloaded {} bytes from {} to {:?}", written, url, dest);
        Ok(dest)
    }
}

impl ResourceFetcher for DownloadManager {
    fn download(&mut self, locator: &str) -> Result<PathBuf> {
        if let Some(path) = self.resolved.get(locator) {
            return Ok(path.clone());
        }
        let path = if Self::is_remote(locator) {
            self.fetch_remote(locator)?
        } else {
            self.resolve_local(locator)?
        };
        debug!("Resolved {} to {:?}", locator, path);
        self.resolved.insert(locator.to_string(), path.clone());
        Ok(path)
    }

    fn download_and_extract(&mut self, locator: &str) -> Result<PathBuf> {
        let path = self.download(locator)?;
        if path.is_dir() || !is_zip(&path) {
            return Ok(path);
        }

        let dest = self.cache_dir.join("extracted").join(extraction_dir_name(&path)?);
        if dest.is_dir() {
            info!("Using extracted copy of {}: {:?}", locator, dest);
        } else {
            let partial = self.cache_dir.join("tmp").join(format!(
                "{}.extracting",
                dest.file_name().and_then(|n| n.to_str()).unwrap_or("archive")
            ));
            if partial.exists() {
                fs::remove_dir_all(&partial)?;
            }
            extract_zip(&path, &partial)?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&partial, &dest)?;
        }
        Ok(dest)
    }
}
