use std::collections::BTreeMap;

use super::value::FeatureValue;

/// One labeled example produced by a generator.
///
/// `key` identifies the example within its split (a file path or archive entry path),
/// `fields` maps feature names to values and must match the dataset's declared features.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub fields: BTreeMap<String, FeatureValue>,
}

impl Record {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds or overwrites a field and returns the record, for chaining
    pub fn with_field(mut self, name: impl Into<String>, value: FeatureValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}
