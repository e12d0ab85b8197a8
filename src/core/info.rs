use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::info;

use super::features::{FeatureType, Features};
use crate::error::{DatasetError, Result};

/// The (input, output) pair used by supervised training loops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisedKeys {
    pub input: String,
    pub output: String,
}

impl SupervisedKeys {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Descriptive metadata for one dataset configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub description: String,
    pub features: Features,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub citation: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub supervised_keys: Option<SupervisedKeys>,
    #[serde(default)]
    pub version: Option<String>,
}

impl DatasetInfo {
    pub fn new(description: impl Into<String>, features: Features) -> Self {
        Self {
            description: description.into(),
            features,
            ..Default::default()
        }
    }

    pub fn with_supervised_keys(mut self, keys: SupervisedKeys) -> Self {
        self.supervised_keys = Some(keys);
        self
    }

    /// Check the schema is consistent with itself
    pub fn validate(&self) -> Result<()> {
        if self.features.is_empty() {
            return Err(DatasetError::InvalidSchema(
                "dataset declares no features".to_string(),
            ));
        }
        if let Some(keys) = &self.supervised_keys {
            for key in [&keys.input, &keys.output] {
                if !self.features.contains(key) {
                    return Err(DatasetError::InvalidSchema(format!(
                        "supervised key '{}' is not a declared feature",
                        key
                    )));
                }
            }
        }
        for (name, ty) in self.features.iter() {
            if let FeatureType::ClassLabel { names } = ty {
                let mut seen = HashSet::new();
                if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
                    return Err(DatasetError::InvalidSchema(format!(
                        "class label '{}' lists '{}' twice",
                        name, dup
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Example count of one generated split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitInfo {
    pub name: String,
    pub num_examples: usize,
}

/// Info persisted for one configuration by the verification command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigInfos {
    #[serde(flatten)]
    pub info: DatasetInfo,
    pub splits: Vec<SplitInfo>,
}

/// Contents of `dataset_infos.json`: one entry per configuration name
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetInfos {
    pub configs: BTreeMap<String, ConfigInfos>,
}

impl DatasetInfos {
    pub const FILE_NAME: &'static str = "dataset_infos.json";

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Merge into an existing file (if any) so other configurations are kept
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut merged = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        for (name, infos) in &self.configs {
            merged.configs.insert(name.clone(), infos.clone());
        }
        fs::write(path, serde_json::to_string_pretty(&merged)?)?;
        info!("Dataset infos saved to: {:?}", path);
        Ok(())
    }
}
