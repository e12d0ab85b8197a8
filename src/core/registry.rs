use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{DatasetError, Result};

/// A named variant of a dataset and the resources it is built from.
///
/// Behavior never varies by configuration, only data does: `data_urls` maps a resource
/// role (e.g. `"images"`, `"train"`) to a URL or path, and selecting a configuration
/// decides which of those resources get fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data_urls: BTreeMap<String, String>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl BuilderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            data_urls: BTreeMap::new(),
            version: default_version(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_url(mut self, role: impl Into<String>, locator: impl Into<String>) -> Self {
        self.data_urls.insert(role.into(), locator.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn url(&self, role: &str) -> Option<&str> {
        self.data_urls.get(role).map(String::as_str)
    }
}

/// Ordered set of configurations. The first one registered is the default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<BuilderConfig>", into = "Vec<BuilderConfig>")]
pub struct ConfigRegistry {
    configs: Vec<BuilderConfig>,
}

impl ConfigRegistry {
    pub fn new(configs: Vec<BuilderConfig>) -> Result<Self> {
        let mut registry = Self::default();
        for config in configs {
            registry.register(config)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, config: BuilderConfig) -> Result<()> {
        if self.configs.iter().any(|c| c.name == config.name) {
            return Err(DatasetError::DuplicateConfig(config.name));
        }
        self.configs.push(config);
        Ok(())
    }

    pub fn default_config(&self) -> Option<&BuilderConfig> {
        self.configs.first()
    }

    pub fn get(&self, name: &str) -> Result<&BuilderConfig> {
        self.configs
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DatasetError::UnknownConfig {
                name: name.to_string(),
                available: self.names().map(String::from).collect(),
            })
    }

    /// Look up `name`, or the default configuration when `name` is `None`
    pub fn select(&self, name: Option<&str>) -> Result<&BuilderConfig> {
        match name {
            Some(name) => self.get(name),
            None => self.default_config().ok_or_else(|| DatasetError::UnknownConfig {
                name: "<default>".to_string(),
                available: Vec::new(),
            }),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.iter().map(|c| c.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuilderConfig> {
        self.configs.iter()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

impl TryFrom<Vec<BuilderConfig>> for ConfigRegistry {
    type Error = DatasetError;

    fn try_from(configs: Vec<BuilderConfig>) -> Result<Self> {
        Self::new(configs)
    }
}

impl From<ConfigRegistry> for Vec<BuilderConfig> {
    fn from(registry: ConfigRegistry) -> Self {
        registry.configs
    }
}
