use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::core::report::MetadataPolicy;
use crate::error::{DatasetError, Result};

/// Environment variable overriding the default cache directory
pub const CACHE_ENV_VAR: &str = "IMAGE_DATASET_CACHE";

/// Loader settings shared by the library and the command line tool.
///
/// Every field has a default, so a settings file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Where downloads and extracted archives are kept
    pub cache_dir: PathBuf,

    /// What to do with dangling metadata rows and images without metadata
    pub metadata_policy: MetadataPolicy,

    /// Force (`true`) or keep (`false`) directory-derived labels.
    /// Unset means labels are dropped only when metadata files exist.
    pub drop_labels: Option<bool>,

    /// Ignore `metadata.jsonl` files entirely
    pub drop_metadata: bool,

    /// Decode every image during verification
    pub verify_images: bool,

    /// Directory for timestamped log files; stdout only when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            metadata_policy: MetadataPolicy::Strict,
            drop_labels: None,
            drop_metadata: false,
            verify_images: false,
            log_dir: None,
        }
    }
}

/// `$IMAGE_DATASET_CACHE`, else the platform cache directory, else a temp directory
pub fn default_cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CACHE_ENV_VAR) {
        return PathBuf::from(dir);
    }
    ProjectDirs::from("org", "image-dataset", "image-dataset-builder")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("image-dataset-builder"))
}

impl LoaderConfig {
    /// Read settings from disk. Missing keys take their defaults; a missing or corrupted
    /// file is an error.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Load settings from disk, or return defaults if the file is missing or corrupted
    pub fn load(path: &Path) -> Self {
        info!("Loading settings from: {:?}", path);

        match Self::read(path) {
            Ok(config) => {
                info!("Successfully loaded settings");
                config
            }
            Err(DatasetError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings file found. Using defaults.");
                Self::default()
            }
            Err(e) => {
                warn!("Failed to load settings file: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Settings saved to: {:?}", path);
        Ok(())
    }
}
